use std::time::Instant;

use tracing::debug;

use super::{CapturedFrame, SourceAdapter, SourceError};
use crate::mode::AcquisitionMode;

/// Camera permission/acquisition boundary.
pub trait MediaDevices: Send {
    fn open_camera(&mut self) -> Result<Box<dyn CameraStream>, SourceError>;
}

/// A running camera stream.
///
/// `stop` ends every track and is a no-op on an already stopped stream.
pub trait CameraStream: Send {
    fn latest_frame(&mut self) -> Result<image::DynamicImage, SourceError>;
    fn is_active(&self) -> bool;
    fn active_tracks(&self) -> usize;
    fn stop(&mut self);
}

/// Used when the build has no camera backend; every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMediaDevices;

impl MediaDevices for NoMediaDevices {
    fn open_camera(&mut self) -> Result<Box<dyn CameraStream>, SourceError> {
        Err(SourceError::NoDevice)
    }
}

pub struct CameraSource {
    stream: Box<dyn CameraStream>,
    started: Instant,
}

impl CameraSource {
    pub fn acquire(devices: &mut dyn MediaDevices) -> Result<Self, SourceError> {
        let stream = devices.open_camera()?;
        Ok(Self {
            stream,
            started: Instant::now(),
        })
    }
}

impl SourceAdapter for CameraSource {
    fn kind(&self) -> AcquisitionMode {
        AcquisitionMode::Webcam
    }

    fn is_live(&self) -> bool {
        self.stream.is_active()
    }

    fn current_frame(&mut self) -> Result<CapturedFrame, SourceError> {
        if !self.stream.is_active() {
            return Err(SourceError::Released);
        }
        let image = self.stream.latest_frame()?;
        Ok(CapturedFrame {
            image,
            captured_at: self.started.elapsed().as_secs_f64(),
        })
    }

    fn release(&mut self) {
        if self.stream.active_tracks() > 0 {
            debug!("Stopping {} camera track(s)", self.stream.active_tracks());
        }
        self.stream.stop();
    }

    fn active_tracks(&self) -> usize {
        self.stream.active_tracks()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stream.stop();
    }
}
