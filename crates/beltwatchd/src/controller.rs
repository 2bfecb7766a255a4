//! Acquisition mode state machine and result reconciliation.
//!
//! [`ModeController`] owns the active source, the camera lifetime and the
//! [`FrameSampler`]. Every sample is handed to a [`Pipeline`] task which asks
//! the analyzer, decodes the frame and, if the result is still current,
//! updates the shared [`MonitorState`] (history, last result, overlay
//! surface).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use beltwatch::overlay::{self, DecodedImage, OverlayStyle};
use beltwatch::source::{
    CameraSource, FrameSequenceVideo, MediaDevices, SourceAdapter, SourceError, StaticImageSource,
};
use beltwatch::{
    AcquisitionMode, FrameEncoding, FrameError, FrameSample, HistoryBuffer, MeasurementRecord,
};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Analyzer;
use crate::config::DaemonConfig;
use crate::sampler::FrameSampler;

/// What to do with a response that resolves after a newer one, or after the
/// source it was captured from has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Apply only results from the current epoch that are newer than the
    /// last applied one.
    #[default]
    DropStale,
    /// Whatever resolves last is shown.
    LastWins,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("camera unavailable: {0}")]
    Acquisition(#[source] SourceError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("no video loaded")]
    NoVideo,
    #[error("only valid in {0} mode")]
    WrongMode(AcquisitionMode),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ═══════════════════════════════════════════════════════════════════════════
// Shared session state
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTicket {
    pub epoch: u64,
    pub seq: u64,
}

#[derive(Debug)]
pub struct MonitorState {
    history: HistoryBuffer,
    last_result: Option<MeasurementRecord>,
    surface: Option<RgbaImage>,
    epoch: u64,
    last_applied_seq: u64,
    applied: u64,
    failures: u64,
    dropped_stale: u64,
}

impl MonitorState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: HistoryBuffer::new(history_capacity),
            last_result: None,
            surface: None,
            epoch: 0,
            last_applied_seq: 0,
            applied: 0,
            failures: 0,
            dropped_stale: 0,
        }
    }

    fn accepts(&self, ticket: SampleTicket, policy: StalePolicy) -> bool {
        match policy {
            StalePolicy::LastWins => true,
            StalePolicy::DropStale => {
                ticket.epoch == self.epoch && ticket.seq > self.last_applied_seq
            }
        }
    }

    fn apply(
        &mut self,
        ticket: SampleTicket,
        record: MeasurementRecord,
        decoded: Option<&DecodedImage>,
        style: &OverlayStyle,
    ) {
        if let Some(frame) = decoded {
            let elapsed = (record.captured_at > 0.0)
                .then(|| Duration::from_secs_f64(record.captured_at));
            let surface = self.surface.get_or_insert_with(|| RgbaImage::new(1, 1));
            overlay::paint(surface, frame, &record, style, elapsed);
        }
        self.history.push(record);
        self.last_result = Some(record);
        self.last_applied_seq = self.last_applied_seq.max(ticket.seq);
        self.applied += 1;
    }

    /// Forget results and invalidate everything in flight.
    fn reset_results(&mut self) {
        self.history.clear();
        self.last_result = None;
        self.surface = None;
        self.bump_epoch();
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn last_result(&self) -> Option<MeasurementRecord> {
        self.last_result
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Reconciliation pipeline
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Applied(MeasurementRecord),
    /// Analyzer unreachable or errored; nothing changed.
    Failed,
    /// Superseded by a newer result or a source change.
    Stale,
}

#[derive(Clone)]
pub struct Pipeline {
    analyzer: Arc<dyn Analyzer>,
    state: Arc<Mutex<MonitorState>>,
    style: Arc<OverlayStyle>,
    policy: StalePolicy,
    overlay_out: Option<PathBuf>,
    next_seq: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        state: Arc<Mutex<MonitorState>>,
        style: OverlayStyle,
        policy: StalePolicy,
    ) -> Self {
        Self {
            analyzer,
            state,
            style: Arc::new(style),
            policy,
            overlay_out: None,
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Write the surface as PNG here after each applied result.
    pub fn with_overlay_output(mut self, path: Option<PathBuf>) -> Self {
        self.overlay_out = path;
        self
    }

    pub fn state(&self) -> &Arc<Mutex<MonitorState>> {
        &self.state
    }

    /// Tag a sample with the current epoch and the next sequence number.
    pub fn ticket(&self) -> SampleTicket {
        SampleTicket {
            epoch: lock(&self.state).epoch,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// Spawn analysis of one sample. Does not wait for earlier samples.
    pub fn submit(&self, sample: FrameSample) -> JoinHandle<Outcome> {
        self.submit_with(self.ticket(), sample)
    }

    /// Like [`Pipeline::submit`] with a ticket taken at capture time.
    pub fn submit_with(&self, ticket: SampleTicket, sample: FrameSample) -> JoinHandle<Outcome> {
        let this = self.clone();
        tokio::spawn(async move { this.process(ticket, sample).await })
    }

    pub async fn process(&self, ticket: SampleTicket, sample: FrameSample) -> Outcome {
        let record = match self.analyzer.analyze(&sample).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Analysis failed, keeping previous overlay: {}", e);
                lock(&self.state).failures += 1;
                return Outcome::Failed;
            }
        };

        let decoded = match tokio::task::spawn_blocking(move || overlay::decode(&sample)).await {
            Ok(Ok(img)) => Some(img),
            Ok(Err(e)) => {
                warn!("Could not decode frame for overlay: {}", e);
                None
            }
            Err(e) => {
                warn!("Overlay decode task failed: {}", e);
                None
            }
        };

        let snapshot = {
            let mut st = lock(&self.state);
            if !st.accepts(ticket, self.policy) {
                st.dropped_stale += 1;
                debug!(
                    "Dropping stale result seq={} epoch={} (current epoch {}, last seq {})",
                    ticket.seq, ticket.epoch, st.epoch, st.last_applied_seq
                );
                return Outcome::Stale;
            }
            st.apply(ticket, record, decoded.as_ref(), &self.style);
            debug!(
                "Applied seq={} offset={:+.1}px status={}",
                ticket.seq, record.offset_pixels, record.status
            );
            match (&self.overlay_out, decoded.is_some()) {
                (Some(path), true) => st.surface.clone().map(|s| (path.clone(), s)),
                _ => None,
            }
        };

        if let Some((path, surface)) = snapshot {
            let saved = tokio::task::spawn_blocking(move || surface.save(&path)).await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Could not write overlay: {}", e),
                Err(e) => warn!("Overlay write task failed: {}", e),
            }
        }

        Outcome::Applied(record)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mode controller
// ═══════════════════════════════════════════════════════════════════════════

enum ActiveSource {
    None,
    Upload(Arc<Mutex<StaticImageSource>>),
    Video {
        path: PathBuf,
        video: Arc<Mutex<FrameSequenceVideo>>,
    },
    Webcam(Arc<Mutex<CameraSource>>),
}

impl ActiveSource {
    fn release(&mut self) {
        match std::mem::replace(self, ActiveSource::None) {
            ActiveSource::None => {}
            ActiveSource::Upload(src) => lock(&src).release(),
            ActiveSource::Video { video, .. } => lock(&video).release(),
            ActiveSource::Webcam(cam) => lock(&cam).release(),
        }
    }

    fn active_tracks(&self) -> usize {
        match self {
            ActiveSource::Webcam(cam) => lock(cam).active_tracks(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStatus {
    pub path: PathBuf,
    pub playing: bool,
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub mode: AcquisitionMode,
    pub sampling: bool,
    pub active_tracks: usize,
    pub video: Option<VideoStatus>,
    pub last_result: Option<MeasurementRecord>,
    /// Newest first.
    pub history: Vec<MeasurementRecord>,
    pub applied: u64,
    pub failures: u64,
    pub dropped_stale: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Cadences {
    pub video: Duration,
    pub webcam: Duration,
}

impl Cadences {
    pub fn from_config(cfg: &DaemonConfig) -> Self {
        Self {
            video: cfg
                .cadence_for(AcquisitionMode::Video)
                .unwrap_or(Duration::from_millis(1000)),
            webcam: cfg
                .cadence_for(AcquisitionMode::Webcam)
                .unwrap_or(Duration::from_millis(500)),
        }
    }
}

pub struct ModeController {
    mode: AcquisitionMode,
    source: ActiveSource,
    devices: Box<dyn MediaDevices>,
    sampler: FrameSampler,
    pipeline: Pipeline,
    cadences: Cadences,
    encoding: FrameEncoding,
}

impl ModeController {
    pub fn new(
        pipeline: Pipeline,
        devices: Box<dyn MediaDevices>,
        cadences: Cadences,
        encoding: FrameEncoding,
    ) -> Self {
        Self {
            mode: AcquisitionMode::Upload,
            source: ActiveSource::None,
            devices,
            sampler: FrameSampler::new(encoding),
            pipeline,
            cadences,
            encoding,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }

    pub fn active_tracks(&self) -> usize {
        self.source.active_tracks()
    }

    pub fn state(&self) -> &Arc<Mutex<MonitorState>> {
        self.pipeline.state()
    }

    pub fn select_mode(&mut self, mode: AcquisitionMode) -> Result<(), ControlError> {
        if mode == self.mode {
            return Ok(());
        }

        if mode == AcquisitionMode::Webcam {
            // Acquire before leaving so a denial leaves everything as it was.
            let camera = CameraSource::acquire(&mut *self.devices).map_err(|e| {
                warn!("Camera acquisition failed, staying in {} mode: {}", self.mode, e);
                ControlError::Acquisition(e)
            })?;
            self.leave_current();
            let camera = Arc::new(Mutex::new(camera));
            self.source = ActiveSource::Webcam(Arc::clone(&camera));
            self.enter(mode);
            self.start_sampling(self.cadences.webcam, camera);
            return Ok(());
        }

        self.leave_current();
        self.enter(mode);
        Ok(())
    }

    /// Select a still image; it is analyzed once, immediately.
    pub fn load_upload(&mut self, path: &Path) -> Result<JoinHandle<Outcome>, ControlError> {
        let mut source = StaticImageSource::open(path)?;
        self.select_mode(AcquisitionMode::Upload)?;
        self.source.release();
        lock(self.pipeline.state()).bump_epoch();

        let frame = source.current_frame()?;
        let sample = FrameSample::encode(&frame.image, frame.captured_at, self.encoding)?;
        self.source = ActiveSource::Upload(Arc::new(Mutex::new(source)));
        info!("Analyzing upload {:?}", path);
        Ok(self.pipeline.submit(sample))
    }

    /// Load a frame-sequence clip (paused) and start the sampler; ticks only
    /// capture while it plays.
    pub fn load_video(&mut self, dir: &Path, fps: f64) -> Result<(), ControlError> {
        let video = FrameSequenceVideo::open(dir, fps)?;
        self.select_mode(AcquisitionMode::Video)?;
        self.sampler.stop();
        self.source.release();
        lock(self.pipeline.state()).bump_epoch();

        let video = Arc::new(Mutex::new(video));
        self.source = ActiveSource::Video {
            path: dir.to_path_buf(),
            video: Arc::clone(&video),
        };
        info!("Loaded video {:?}", dir);
        self.start_sampling(self.cadences.video, video);
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), ControlError> {
        self.with_video(|v| v.play())
    }

    pub fn pause(&mut self) -> Result<(), ControlError> {
        self.with_video(|v| v.pause())
    }

    pub fn seek(&mut self, seconds: f64) -> Result<(), ControlError> {
        self.with_video(|v| v.seek(seconds))
    }

    /// Drop the loaded video together with every result derived from it.
    pub fn reset_video(&mut self) -> Result<(), ControlError> {
        if self.mode != AcquisitionMode::Video {
            return Err(ControlError::WrongMode(AcquisitionMode::Video));
        }
        self.sampler.stop();
        self.source.release();
        lock(self.pipeline.state()).reset_results();
        info!("Video reset");
        Ok(())
    }

    pub fn clear_history(&mut self) {
        lock(self.pipeline.state()).history.clear();
    }

    /// Stop sampling and release every held resource. The mode is kept.
    pub fn shutdown(&mut self) {
        self.sampler.stop();
        self.source.release();
        lock(self.pipeline.state()).bump_epoch();
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let video = match &self.source {
            ActiveSource::Video { path, video } => {
                let v = lock(video);
                Some(VideoStatus {
                    path: path.clone(),
                    playing: v.is_playing(),
                    current_time: v.current_time(),
                    duration: v.duration(),
                })
            }
            _ => None,
        };
        let st = lock(self.pipeline.state());
        MonitorSnapshot {
            mode: self.mode,
            sampling: self.sampler.is_running(),
            active_tracks: self.source.active_tracks(),
            video,
            last_result: st.last_result,
            history: st.history.all(),
            applied: st.applied,
            failures: st.failures,
            dropped_stale: st.dropped_stale,
        }
    }

    fn with_video(&mut self, f: impl FnOnce(&mut FrameSequenceVideo)) -> Result<(), ControlError> {
        if self.mode != AcquisitionMode::Video {
            return Err(ControlError::WrongMode(AcquisitionMode::Video));
        }
        match &self.source {
            ActiveSource::Video { video, .. } => {
                f(&mut lock(video));
                Ok(())
            }
            _ => Err(ControlError::NoVideo),
        }
    }

    fn leave_current(&mut self) {
        self.sampler.stop();
        if self.mode == AcquisitionMode::Webcam {
            debug!("Releasing camera stream");
        }
        self.source.release();
    }

    fn enter(&mut self, mode: AcquisitionMode) {
        info!("Mode {} -> {}", self.mode, mode);
        self.mode = mode;
        lock(self.pipeline.state()).bump_epoch();
    }

    fn start_sampling<S>(&mut self, cadence: Duration, source: Arc<Mutex<S>>)
    where
        S: SourceAdapter + 'static,
    {
        // Tickets are taken under the source lock; release() takes the same
        // lock before the epoch moves on, so old frames carry the old epoch.
        let stamper = self.pipeline.clone();
        let pipeline = self.pipeline.clone();
        self.sampler.start(
            cadence,
            source,
            move || stamper.ticket(),
            move |ticket, sample| {
                pipeline.submit_with(ticket, sample);
            },
        );
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.sampler.stop();
        self.source.release();
    }
}
