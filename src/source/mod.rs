//! Frame sources behind one capture interface.
//!
//! A [`SourceAdapter`] hands out the *current* visual frame at the source's
//! intrinsic resolution. Three adapters exist, one per acquisition mode:
//! - [`StaticImageSource`]: an uploaded still image, captured once.
//! - [`FrameSequenceVideo`]: a seekable clip that can be played and paused.
//! - [`CameraSource`]: a live stream obtained through [`MediaDevices`].
//!
//! Camera permission and device access are abstracted by [`MediaDevices`] /
//! [`CameraStream`] so the pipeline can run against in-memory fakes.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

use crate::mode::AcquisitionMode;

mod camera;
#[cfg(feature = "webcam")]
mod native;
mod video;

pub use camera::{CameraSource, CameraStream, MediaDevices, NoMediaDevices};
#[cfg(feature = "webcam")]
pub use native::NokhwaDevices;
pub use video::FrameSequenceVideo;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device available")]
    NoDevice,
    #[error("camera error: {0}")]
    Device(String),
    #[error("failed to load image {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0:?} contains no frames")]
    NoFrames(PathBuf),
    #[error("no frame available yet")]
    NoFrame,
    #[error("source has been released")]
    Released,
}

/// A frame read from a source, with its source-relative time in seconds.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: DynamicImage,
    pub captured_at: f64,
}

pub trait SourceAdapter: Send {
    fn kind(&self) -> AcquisitionMode;

    /// Whether a sampling tick should capture right now (playing video,
    /// active camera). Still images are never live.
    fn is_live(&self) -> bool;

    fn current_frame(&mut self) -> Result<CapturedFrame, SourceError>;

    /// Release held media. Must be safe to call more than once.
    fn release(&mut self);

    /// Media tracks still running; 0 once released.
    fn active_tracks(&self) -> usize {
        0
    }
}

/// An uploaded still image.
pub struct StaticImageSource {
    path: Option<PathBuf>,
    image: Option<DynamicImage>,
}

impl StaticImageSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| SourceError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            image: Some(image),
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            path: None,
            image: Some(image),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SourceAdapter for StaticImageSource {
    fn kind(&self) -> AcquisitionMode {
        AcquisitionMode::Upload
    }

    fn is_live(&self) -> bool {
        false
    }

    fn current_frame(&mut self) -> Result<CapturedFrame, SourceError> {
        let image = self.image.as_ref().ok_or(SourceError::Released)?;
        Ok(CapturedFrame {
            image: image.clone(),
            captured_at: 0.0,
        })
    }

    fn release(&mut self) {
        self.image = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn static_image_is_never_live_and_captures_at_zero() {
        let mut src = StaticImageSource::from_image(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            4,
            Rgb([1, 2, 3]),
        )));
        assert!(!src.is_live());
        let f = src.current_frame().unwrap();
        assert_eq!((f.image.width(), f.image.height()), (8, 4));
        assert_eq!(f.captured_at, 0.0);

        src.release();
        src.release();
        assert!(matches!(src.current_frame(), Err(SourceError::Released)));
    }

    #[test]
    fn static_image_open_reports_missing_file() {
        let err = StaticImageSource::open("/definitely/not/here.png").err().unwrap();
        assert!(matches!(err, SourceError::Load { .. }));
    }
}
