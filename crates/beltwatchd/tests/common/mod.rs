#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beltwatch::overlay::OverlayStyle;
use beltwatch::source::{CameraStream, MediaDevices, SourceError};
use beltwatch::{FrameEncoding, FrameSample, MeasurementRecord, Severity};
use beltwatchd::client::{AnalysisError, Analyzer};
use beltwatchd::controller::{Cadences, ModeController, MonitorState, Pipeline, StalePolicy};
use image::{DynamicImage, Rgb, RgbImage};

pub type Scripted = Result<(f64, Severity), u16>;

/// Replies from a script in call order; errors once the script runs out.
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Scripted>>,
    pub calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, frame: &FrameSample) -> Result<MeasurementRecord, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok((px, status))) => Ok(MeasurementRecord::new(
                px,
                px / 4.0,
                status,
                frame.captured_at(),
            )),
            Some(Err(code)) => Err(AnalysisError::Status(code)),
            None => Err(AnalysisError::Status(503)),
        }
    }
}

/// Sleeps `captured_at` milliseconds, then reports it as the pixel offset.
pub struct DelayedAnalyzer;

#[async_trait]
impl Analyzer for DelayedAnalyzer {
    async fn analyze(&self, frame: &FrameSample) -> Result<MeasurementRecord, AnalysisError> {
        let ms = frame.captured_at();
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        Ok(MeasurementRecord::new(ms, 0.0, Severity::Ok, ms))
    }
}

/// Holds every request until [`GatedAnalyzer::open`] lets one through.
pub struct GatedAnalyzer {
    gate: tokio::sync::Semaphore,
    pub calls: AtomicUsize,
}

impl GatedAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: tokio::sync::Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    async fn analyze(&self, frame: &FrameSample) -> Result<MeasurementRecord, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|_| AnalysisError::Status(503))?;
        permit.forget();
        Ok(MeasurementRecord::new(
            1.0,
            0.25,
            Severity::Ok,
            frame.captured_at(),
        ))
    }
}

pub struct FakeStream {
    tracks: Arc<AtomicUsize>,
    captures: Arc<AtomicUsize>,
    frame_delay: Duration,
}

impl CameraStream for FakeStream {
    fn latest_frame(&mut self) -> Result<DynamicImage, SourceError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay);
        }
        Ok(test_image(64, 48))
    }
    fn is_active(&self) -> bool {
        self.tracks.load(Ordering::SeqCst) > 0
    }
    fn active_tracks(&self) -> usize {
        self.tracks.load(Ordering::SeqCst)
    }
    fn stop(&mut self) {
        self.tracks.store(0, Ordering::SeqCst);
    }
}

/// Camera fake; `tracks` counts running tracks across every opened stream.
pub struct FakeDevices {
    pub allow: bool,
    pub tracks: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
    /// Frame grabs started on any stream.
    pub captures: Arc<AtomicUsize>,
    /// How long each frame grab blocks.
    pub frame_delay: Duration,
}

impl FakeDevices {
    pub fn new(allow: bool) -> Self {
        Self {
            allow,
            tracks: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
            captures: Arc::new(AtomicUsize::new(0)),
            frame_delay: Duration::ZERO,
        }
    }
}

impl MediaDevices for FakeDevices {
    fn open_camera(&mut self) -> Result<Box<dyn CameraStream>, SourceError> {
        if !self.allow {
            return Err(SourceError::PermissionDenied);
        }
        assert_eq!(
            self.tracks.load(Ordering::SeqCst),
            0,
            "previous stream must be released first"
        );
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.tracks.store(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            tracks: Arc::clone(&self.tracks),
            captures: Arc::clone(&self.captures),
            frame_delay: self.frame_delay,
        }))
    }
}

pub fn test_image(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([30, 60, 90])))
}

pub fn sample(captured_at: f64) -> FrameSample {
    FrameSample::encode(&test_image(32, 24), captured_at, FrameEncoding::Png).unwrap()
}

pub fn pipeline(analyzer: Arc<dyn Analyzer>, policy: StalePolicy) -> Pipeline {
    let state = Arc::new(Mutex::new(MonitorState::new(20)));
    Pipeline::new(analyzer, state, OverlayStyle::default(), policy)
}

pub fn controller(analyzer: Arc<dyn Analyzer>, devices: FakeDevices) -> ModeController {
    ModeController::new(
        pipeline(analyzer, StalePolicy::DropStale),
        Box::new(devices),
        Cadences {
            video: Duration::from_millis(1000),
            webcam: Duration::from_millis(1000),
        },
        FrameEncoding::Png,
    )
}

/// Let spawned work (including blocking decode threads) finish until `done`.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached");
}

/// Give the scheduler a few rounds so timer wakeups get handled.
pub async fn spin() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Resolved results (applied, failed or stale) seen by the controller.
pub fn settled(c: &ModeController) -> u64 {
    let s = c.snapshot();
    s.applied + s.failures + s.dropped_stale
}
