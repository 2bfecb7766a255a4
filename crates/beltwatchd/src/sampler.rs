//! Periodic frame capture.
//!
//! While started, every cadence period the sampler checks that its source is
//! live, grabs the current frame, encodes it and hands the [`FrameSample`] to
//! a sink. The sink must not block: ticks never wait for earlier samples to be
//! analyzed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use beltwatch::source::{SourceAdapter, SourceError};
use beltwatch::{FrameEncoding, FrameError, FrameSample};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Grab and encode the current frame if the source is live.
///
/// `stamp` runs while the source lock is still held, so whatever it returns
/// is ordered before any release of that source.
pub fn capture_live<S, T>(
    source: &Mutex<S>,
    encoding: FrameEncoding,
    stamp: impl FnOnce() -> T,
) -> Result<Option<(T, FrameSample)>, CaptureError>
where
    S: SourceAdapter + ?Sized,
{
    let (tag, frame) = {
        let mut src = source.lock().unwrap_or_else(PoisonError::into_inner);
        if !src.is_live() {
            return Ok(None);
        }
        let frame = src.current_frame()?;
        (stamp(), frame)
    };
    let sample = FrameSample::encode(&frame.image, frame.captured_at, encoding)?;
    Ok(Some((tag, sample)))
}

#[derive(Debug)]
pub struct FrameSampler {
    encoding: FrameEncoding,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl FrameSampler {
    pub fn new(encoding: FrameEncoding) -> Self {
        Self {
            encoding,
            task: None,
        }
    }

    /// Start ticking every `cadence`; the first tick comes one period after
    /// the call. A running timer is replaced, never duplicated.
    ///
    /// Each captured frame is tagged by `stamp` under the source lock and
    /// handed to `sink` with that tag.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, T, G, F>(
        &mut self,
        cadence: Duration,
        source: Arc<Mutex<S>>,
        mut stamp: G,
        mut sink: F,
    ) where
        S: SourceAdapter + 'static,
        G: FnMut() -> T + Send + 'static,
        F: FnMut(T, FrameSample) + Send + 'static,
    {
        self.stop();

        let cadence = cadence.max(Duration::from_millis(1));
        let encoding = self.encoding;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + cadence, cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match capture_live(&source, encoding, &mut stamp) {
                    Ok(Some((tag, sample))) => sink(tag, sample),
                    Ok(None) => debug!("Source not live; skipping tick"),
                    Err(e) => warn!("Frame capture failed: {}", e),
                }
            }
        });

        self.task = Some((token, handle));
    }

    /// Cancel the timer. Idempotent; no tick starts after this returns.
    /// A capture already holding the source lock still completes; callers
    /// invalidate it through the tag taken by `stamp`.
    pub fn stop(&mut self) {
        if let Some((token, handle)) = self.task.take() {
            token.cancel();
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
