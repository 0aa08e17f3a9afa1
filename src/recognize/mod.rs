//! Recognition clients.
//!
//! A recognizer takes one normalized crop and answers with a label and a
//! confidence. Submission never fails as a Rust error: transport problems,
//! error statuses and malformed answers come back as an unsuccessful
//! [`RecognitionResult`] so one bad tick never takes the pipeline down.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::normalizer::NormalizedImage;

mod http;
mod stub;

pub use http::HttpRecognizer;
pub use stub::StubRecognizer;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/asl/predict/";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Outcome of one submission.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionResult {
    /// Recognized letter, `None` on failure.
    pub label: Option<char>,
    /// In `[0, 1]`; zero on failure.
    pub confidence: f32,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

impl RecognitionResult {
    pub fn success(label: char, confidence: f32) -> Self {
        Self {
            label: Some(label),
            confidence: confidence.clamp(0.0, 1.0),
            succeeded: true,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            label: None,
            confidence: 0.0,
            succeeded: false,
            failure_reason: Some(reason.into()),
        }
    }
}

impl fmt::Display for RecognitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.succeeded, self.label) {
            (true, Some(label)) => write!(f, "{} ({:.0}%)", label, self.confidence * 100.0),
            _ => write!(
                f,
                "failed: {}",
                self.failure_reason.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Remote (or local stand-in) letter classifier.
pub trait Recognizer: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Classify one crop. Never panics on bad input or a bad service.
    fn submit(&self, image: &NormalizedImage) -> RecognitionResult;
}

/// How the crop travels in the request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestEncoding {
    /// `{"image": "data:image/jpeg;base64,…"}`
    Json,
    /// `image=data%3Aimage%2Fjpeg%3Bbase64%2C…`
    Form,
}

impl FromStr for RequestEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(RequestEncoding::Json),
            "form" | "urlencoded" => Ok(RequestEncoding::Form),
            other => Err(anyhow!("unknown request encoding {:?}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Prediction URL, or `stub://` for the offline recognizer.
    pub endpoint: String,
    /// Alphabet URL; derived from `endpoint` when unset.
    pub letters_endpoint: Option<String>,
    pub timeout_ms: u64,
    pub encoding: RequestEncoding,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            letters_endpoint: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            encoding: RequestEncoding::Json,
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Build the recognizer `config.endpoint` names.
pub fn open_recognizer(config: &RecognitionConfig) -> Result<Arc<dyn Recognizer>> {
    if config.endpoint.starts_with("stub://") {
        return Ok(Arc::new(StubRecognizer::new()));
    }
    Ok(Arc::new(HttpRecognizer::new(config)?))
}
