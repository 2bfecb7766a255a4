use std::path::PathBuf;
use std::sync::Arc;

use beltwatch::AcquisitionMode;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::controller::{ModeController, MonitorSnapshot, Outcome};

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Messages
// ═══════════════════════════════════════════════════════════════════════════

fn default_fps() -> f64 {
    25.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetState,
    SelectMode {
        mode: AcquisitionMode,
    },
    /// Analyze one still image, switching to upload mode if needed.
    LoadUpload {
        path: PathBuf,
    },
    /// Load a directory of frames as a clip (initially paused).
    LoadVideo {
        path: PathBuf,
        #[serde(default = "default_fps")]
        fps: f64,
    },
    Play,
    Pause,
    Seek {
        seconds: f64,
    },
    ResetVideo,
    ClearHistory,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum Response {
    State { state: MonitorSnapshot },
    Success { message: String },
    Error { message: String },
}

fn ok(message: impl Into<String>) -> Response {
    Response::Success {
        message: message.into(),
    }
}

fn err(e: impl std::fmt::Display) -> Response {
    Response::Error {
        message: e.to_string(),
    }
}

/// Apply one request. Uploads are awaited so the reply reflects the result.
pub async fn dispatch(controller: &Mutex<ModeController>, request: Request) -> Response {
    let pending = {
        let mut c = controller.lock().await;
        match request {
            Request::GetState => return Response::State { state: c.snapshot() },
            Request::SelectMode { mode } => {
                return match c.select_mode(mode) {
                    Ok(()) => ok(format!("mode {}", mode)),
                    Err(e) => err(e),
                }
            }
            Request::LoadUpload { path } => match c.load_upload(&path) {
                Ok(handle) => handle,
                Err(e) => return err(e),
            },
            Request::LoadVideo { path, fps } => {
                return match c.load_video(&path, fps) {
                    Ok(()) => ok(format!("loaded {}", path.display())),
                    Err(e) => err(e),
                }
            }
            Request::Play => return c.play().map(|()| ok("playing")).unwrap_or_else(err),
            Request::Pause => return c.pause().map(|()| ok("paused")).unwrap_or_else(err),
            Request::Seek { seconds } => {
                return c
                    .seek(seconds)
                    .map(|()| ok(format!("seeked to {:.2}s", seconds)))
                    .unwrap_or_else(err)
            }
            Request::ResetVideo => return c.reset_video().map(|()| ok("reset")).unwrap_or_else(err),
            Request::ClearHistory => {
                c.clear_history();
                return ok("history cleared");
            }
            Request::Shutdown => {
                c.shutdown();
                return ok("shutting down");
            }
        }
    };

    // Lock released while the analyzer works.
    match pending.await {
        Ok(Outcome::Applied(r)) => ok(format!(
            "offset {:+.1}px {:+.1}mm {}",
            r.offset_pixels, r.offset_physical, r.status
        )),
        Ok(Outcome::Failed) => err("analysis failed; previous result kept"),
        Ok(Outcome::Stale) => err("result superseded"),
        Err(e) => err(e),
    }
}

pub async fn handle_client(
    stream: TcpStream,
    controller: Arc<Mutex<ModeController>>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let stop = matches!(request, Request::Shutdown);
                let resp = dispatch(&controller, request).await;
                if stop {
                    info!("Shutdown requested by client");
                    shutdown.cancel();
                }
                resp
            }
            Err(e) => {
                warn!("Invalid request: {}", e);
                err(format!("Invalid request: {}", e))
            }
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}
