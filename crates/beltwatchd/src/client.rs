use async_trait::async_trait;
use beltwatch::{FrameSample, MeasurementRecord};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::DaemonConfig;

/// How a frame travels to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `{"image": "data:image/jpeg;base64,..."}`
    #[default]
    Json,
    /// Multipart form with one binary `file` field.
    Multipart,
}

/// The analyzer could not be asked or did not answer usefully.
///
/// Distinct from a reply with missing fields, which still normalizes into a
/// record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analyzer request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("analyzer request timed out")]
    Timeout,
    #[error("analyzer returned HTTP {0}")]
    Status(u16),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalysisError::Timeout
        } else {
            AnalysisError::Transport(e)
        }
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, frame: &FrameSample) -> Result<MeasurementRecord, AnalysisError>;
}

pub struct HttpAnalyzer {
    client: reqwest::Client,
    analyze_url: String,
    health_url: String,
    payload: PayloadFormat,
}

impl HttpAnalyzer {
    pub fn new(cfg: &DaemonConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            client,
            analyze_url: cfg.analyze_url(),
            health_url: cfg.health_url(),
            payload: cfg.payload,
        })
    }

    pub fn analyze_url(&self) -> &str {
        &self.analyze_url
    }

    /// `GET {base}/health` got an HTTP answer. Analyzers without that route
    /// answer 404 and still count as reachable.
    pub async fn health(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(resp) => {
                debug!("Health check answered {}", resp.status());
                true
            }
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, frame: &FrameSample) -> Result<MeasurementRecord, AnalysisError> {
        let request = match self.payload {
            PayloadFormat::Json => self
                .client
                .post(&self.analyze_url)
                .json(&json!({ "image": frame.to_data_url() })),
            PayloadFormat::Multipart => {
                let part = Part::bytes(frame.bytes().to_vec())
                    .file_name(frame.file_name())
                    .mime_str(frame.mime())?;
                self.client
                    .post(&self.analyze_url)
                    .multipart(Form::new().part("file", part))
            }
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            debug!("Analyzer reply is not JSON ({}); using defaults", e);
            Value::Null
        });
        Ok(MeasurementRecord::from_reply(&body, frame.captured_at()))
    }
}
