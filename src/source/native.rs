//! Native camera capture through `nokhwa`.
//!
//! The capture device is driven from a dedicated thread; the stream handle
//! only shares the most recent decoded frame with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::{DynamicImage, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use super::{CameraStream, MediaDevices, SourceError};

type FrameSlot = Arc<Mutex<Option<DynamicImage>>>;

#[derive(Debug, Clone)]
pub struct NokhwaDevices {
    index: u32,
}

impl NokhwaDevices {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl MediaDevices for NokhwaDevices {
    fn open_camera(&mut self) -> Result<Box<dyn CameraStream>, SourceError> {
        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let index = self.index;
        let thread_slot = Arc::clone(&slot);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("beltwatch-camera".to_string())
            .spawn(move || capture_loop(index, thread_slot, thread_running, ready_tx))
            .map_err(|e| SourceError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Camera {} streaming", index);
                Ok(Box::new(NokhwaStream {
                    slot,
                    running,
                    handle: Some(handle),
                }))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SourceError::Device("camera thread exited during start-up".to_string()))
            }
        }
    }
}

fn capture_loop(
    index: u32,
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), SourceError>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(SourceError::Device(e.to_string())));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(SourceError::Device(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Acquire) {
        let decoded = camera
            .frame()
            .and_then(|buf| buf.decode_image::<RgbFormat>());
        match decoded {
            Ok(img) => {
                let (w, h) = (img.width(), img.height());
                // nokhwa may link a different `image` major; go through raw bytes.
                if let Some(rgb) = RgbImage::from_raw(w, h, img.into_raw()) {
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(DynamicImage::ImageRgb8(rgb));
                }
            }
            Err(e) => {
                warn!("Camera frame error: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        debug!("Camera stop_stream: {}", e);
    }
}

struct NokhwaStream {
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CameraStream for NokhwaStream {
    fn latest_frame(&mut self) -> Result<DynamicImage, SourceError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SourceError::NoFrame)
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.is_active())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Camera thread panicked");
            }
        }
    }
}
