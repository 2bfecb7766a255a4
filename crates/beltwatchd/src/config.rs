use std::path::{Path, PathBuf};
use std::time::Duration;

use beltwatch::{AcquisitionMode, FrameEncoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::client::PayloadFormat;
use crate::controller::StalePolicy;

/// Only environment knob: the analyzer base URL.
pub const ENDPOINT_ENV: &str = "BELTWATCH_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

/// Route that takes `{"image": <data URL>}`; the multipart route is `/analyze`.
fn default_analyze_path() -> String {
    "/stream-frame/".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_video_cadence_ms() -> u64 {
    1000
}

fn default_webcam_cadence_ms() -> u64 {
    500
}

fn default_history_capacity() -> usize {
    beltwatch::history::DEFAULT_HISTORY_CAPACITY
}

fn default_listen() -> String {
    "127.0.0.1:9877".to_string()
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Analyzer base URL; `BELTWATCH_ENDPOINT` overrides it.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_analyze_path")]
    pub analyze_path: String,
    #[serde(default)]
    pub payload: PayloadFormat,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_video_cadence_ms")]
    pub video_cadence_ms: u64,
    #[serde(default = "default_webcam_cadence_ms")]
    pub webcam_cadence_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub stale_policy: StalePolicy,

    #[serde(default)]
    pub camera_index: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// TrueType font for the readout panel text.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub write_overlay: bool,

    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            analyze_path: default_analyze_path(),
            payload: PayloadFormat::default(),
            timeout_ms: default_timeout_ms(),
            video_cadence_ms: default_video_cadence_ms(),
            webcam_cadence_ms: default_webcam_cadence_ms(),
            history_capacity: default_history_capacity(),
            stale_policy: StalePolicy::default(),
            camera_index: 0,
            jpeg_quality: default_jpeg_quality(),
            font_path: None,
            write_overlay: true,
            listen: default_listen(),
        }
    }
}

impl DaemonConfig {
    /// Read `path` if it exists; otherwise defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {:?}; using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENDPOINT_ENV) {
            self.apply_endpoint_override(&v);
        }
    }

    fn apply_endpoint_override(&mut self, value: &str) {
        let v = value.trim();
        if !v.is_empty() {
            self.endpoint = v.to_string();
        }
    }

    pub fn analyze_url(&self) -> String {
        join_url(&self.endpoint, &self.analyze_path)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.endpoint, "/health")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// Timer cadence for a streaming mode; uploads sample once.
    pub fn cadence_for(&self, mode: AcquisitionMode) -> Option<Duration> {
        let ms = match mode {
            AcquisitionMode::Upload => return None,
            AcquisitionMode::Video => self.video_cadence_ms,
            AcquisitionMode::Webcam => self.webcam_cadence_ms,
        };
        Some(Duration::from_millis(ms.max(1)))
    }

    pub fn frame_encoding(&self) -> FrameEncoding {
        FrameEncoding::Jpeg {
            quality: self.jpeg_quality.clamp(1, 100),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: DaemonConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.endpoint, "http://localhost:8000");
        assert_eq!(cfg.video_cadence_ms, 1000);
        assert_eq!(cfg.webcam_cadence_ms, 500);
        assert_eq!(cfg.history_capacity, 20);
        assert_eq!(cfg.stale_policy, StalePolicy::DropStale);
        assert_eq!(cfg.payload, PayloadFormat::Json);
        assert!(cfg.write_overlay);
    }

    #[test]
    fn default_route_matches_default_payload() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.payload, PayloadFormat::Json);
        assert_eq!(cfg.analyze_url(), "http://localhost:8000/stream-frame/");

        let cfg: DaemonConfig =
            serde_json::from_str(r#"{"payload": "multipart", "analyze_path": "/analyze"}"#).unwrap();
        assert_eq!(cfg.analyze_url(), "http://localhost:8000/analyze");
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let mut cfg = DaemonConfig::default();
        cfg.apply_endpoint_override(" http://analyzer:9000/ ");
        assert_eq!(cfg.analyze_url(), "http://analyzer:9000/stream-frame/");
        assert_eq!(cfg.health_url(), "http://analyzer:9000/health");

        cfg.apply_endpoint_override("   ");
        assert_eq!(cfg.endpoint, "http://analyzer:9000/");
    }

    #[test]
    fn cadence_per_mode() {
        let cfg = DaemonConfig {
            video_cadence_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.cadence_for(AcquisitionMode::Upload), None);
        assert_eq!(cfg.cadence_for(AcquisitionMode::Video), Some(Duration::from_millis(1)));
        assert_eq!(
            cfg.cadence_for(AcquisitionMode::Webcam),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn load_reads_file_or_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        assert_eq!(DaemonConfig::load(&path).unwrap().timeout_ms, 5000);

        std::fs::write(
            &path,
            r#"{"timeout_ms": 250, "payload": "multipart", "stale_policy": "last-wins"}"#,
        )
        .unwrap();
        let cfg = DaemonConfig::load(&path).unwrap();
        assert_eq!(cfg.timeout_ms, 250);
        assert_eq!(cfg.payload, PayloadFormat::Multipart);
        assert_eq!(cfg.stale_policy, StalePolicy::LastWins);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            DaemonConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
