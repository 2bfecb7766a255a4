//! Belt alignment monitoring daemon.
//!
//! Runs the sampling-and-feedback pipeline in the background:
//! - acquisition mode state machine (upload / video / webcam)
//! - periodic frame capture and remote analysis
//! - overlay rendering and measurement history
//! - JSON-lines control server for UI clients
//!
//! Data directory (config.json, overlay.png):
//! - Linux: ~/.local/share/beltwatch/
//! - Windows: %APPDATA%\beltwatch\
//! - MacOS: ~/Library/Application Support/beltwatch/

use std::sync::{Arc, Mutex as StdMutex};

use beltwatch::overlay::OverlayStyle;
use beltwatch::source::MediaDevices;
use beltwatchd::client::HttpAnalyzer;
use beltwatchd::config::DaemonConfig;
use beltwatchd::controller::{Cadences, ModeController, MonitorState, Pipeline};
use beltwatchd::paths::AppPaths;
use beltwatchd::server::handle_client;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg_attr(not(feature = "webcam"), allow(unused_variables))]
fn media_devices(cfg: &DaemonConfig) -> Box<dyn MediaDevices> {
    #[cfg(feature = "webcam")]
    {
        Box::new(beltwatch::source::NokhwaDevices::new(cfg.camera_index))
    }
    #[cfg(not(feature = "webcam"))]
    {
        warn!("Built without the `webcam` feature; camera mode is unavailable");
        Box::new(beltwatch::source::NoMediaDevices)
    }
}

fn overlay_style(cfg: &DaemonConfig) -> OverlayStyle {
    let style = OverlayStyle::default();
    match &cfg.font_path {
        Some(path) => match style.clone().with_font_file(path) {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not load font {:?}: {}; readout text disabled", path, e);
                style
            }
        },
        None => style,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let paths = AppPaths::from_platform()?;
    let mut cfg = DaemonConfig::load(&paths.config_file())?;
    cfg.apply_env();
    info!("Config file: {:?}", paths.config_file());
    info!("Analyzer endpoint: {} ({:?})", cfg.analyze_url(), cfg.payload);

    let analyzer = HttpAnalyzer::new(&cfg)?;
    if analyzer.health().await {
        info!("Analyzer is reachable");
    } else {
        warn!("Analyzer health check failed; frames will be retried every tick");
    }

    let state = Arc::new(StdMutex::new(MonitorState::new(cfg.history_capacity)));
    let pipeline = Pipeline::new(Arc::new(analyzer), state, overlay_style(&cfg), cfg.stale_policy)
        .with_overlay_output(cfg.write_overlay.then(|| paths.overlay_file()));
    let controller = Arc::new(Mutex::new(ModeController::new(
        pipeline,
        media_devices(&cfg),
        Cadences::from_config(&cfg),
        cfg.frame_encoding(),
    )));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received");
                shutdown.cancel();
            }
        });
    }

    let listener = TcpListener::bind(&cfg.listen).await?;
    info!("beltwatchd listening on {}", cfg.listen);

    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        info!("Client connected: {}", addr);
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, controller, shutdown).await {
                error!("Client handler error: {}", e);
            }
        });
    }

    controller.lock().await.shutdown();
    info!("Sampling stopped; media released");
    Ok(())
}
