use std::path::{Path, PathBuf};
use std::time::Instant;

use image::DynamicImage;
use tracing::debug;

use super::{CapturedFrame, SourceAdapter, SourceError};
use crate::mode::AcquisitionMode;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A seekable clip backed by a directory of still frames at a fixed rate.
///
/// Media time only advances while playing. Playback stops being live once the
/// clock passes the last frame, like an ended video element.
pub struct FrameSequenceVideo {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    fps: f64,
    /// Media time at the last play/pause/seek anchor.
    position: f64,
    playing_since: Option<Instant>,
    released: bool,
    cached: Option<(usize, DynamicImage)>,
}

impl FrameSequenceVideo {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let io_err = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(SourceError::NoFrames(dir.to_path_buf()));
        }
        frames.sort();

        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 25.0 };
        debug!("Loaded {} frames from {:?} at {} fps", frames.len(), dir, fps);

        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            fps,
            position: 0.0,
            playing_since: None,
            released: false,
            cached: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    pub fn current_time(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.position + elapsed).min(self.duration())
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.current_time() >= self.duration()
    }

    pub fn play(&mut self) {
        if self.released || self.is_playing() {
            return;
        }
        if self.is_ended() {
            self.position = 0.0;
        }
        self.playing_since = Some(Instant::now());
    }

    pub fn pause(&mut self) {
        self.position = self.current_time();
        self.playing_since = None;
    }

    pub fn seek(&mut self, seconds: f64) {
        let t = if seconds.is_finite() { seconds } else { 0.0 };
        self.position = t.clamp(0.0, self.duration());
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn frame_index(&self, t: f64) -> usize {
        ((t * self.fps).floor() as usize).min(self.frames.len() - 1)
    }
}

impl SourceAdapter for FrameSequenceVideo {
    fn kind(&self) -> AcquisitionMode {
        AcquisitionMode::Video
    }

    fn is_live(&self) -> bool {
        !self.released && self.is_playing() && !self.is_ended()
    }

    fn current_frame(&mut self) -> Result<CapturedFrame, SourceError> {
        if self.released {
            return Err(SourceError::Released);
        }
        let t = self.current_time();
        let idx = self.frame_index(t);

        let image = match &self.cached {
            Some((cached_idx, img)) if *cached_idx == idx => img.clone(),
            _ => {
                let path = &self.frames[idx];
                let img = image::open(path).map_err(|source| SourceError::Load {
                    path: path.clone(),
                    source,
                })?;
                self.cached = Some((idx, img.clone()));
                img
            }
        };

        Ok(CapturedFrame {
            image,
            captured_at: t,
        })
    }

    fn release(&mut self) {
        self.released = true;
        self.playing_since = None;
        self.cached = None;
    }
}
