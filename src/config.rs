use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::detect::MotionConfig;
use crate::ingest::SourceConfig;
use crate::mode::CaptureMode;
use crate::normalizer::NormalizeConfig;
use crate::recognize::RecognitionConfig;
use crate::scheduler::{CaptureOptions, DEFAULT_PERIOD_MS};

pub const CONFIG_ENV: &str = "GESTURE_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<SourceConfig>,
    motion: Option<MotionConfig>,
    normalize: Option<NormalizeConfig>,
    scheduler: Option<SchedulerConfig>,
    recognition: Option<RecognitionConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub period_ms: u64,
    pub mode: CaptureMode,
    /// Submit the full frame when automatic mode finds no region.
    pub fallback_to_full_frame: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD_MS,
            mode: CaptureMode::Automatic,
            fallback_to_full_frame: false,
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureConfig {
    pub source: SourceConfig,
    pub motion: MotionConfig,
    pub normalize: NormalizeConfig,
    pub scheduler: SchedulerConfig,
    pub recognition: RecognitionConfig,
}

impl CaptureConfig {
    /// Defaults, overlaid by the file named in `GESTURE_CONFIG` (if any),
    /// overlaid by environment variables, then validated.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`load`](Self::load), with the file path given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        Self {
            source: file.source.unwrap_or_default(),
            motion: file.motion.unwrap_or_default(),
            normalize: file.normalize.unwrap_or_default(),
            scheduler: file.scheduler.unwrap_or_default(),
            recognition: file.recognition.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("GESTURE_SOURCE_URI") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(endpoint) = std::env::var("GESTURE_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.recognition.endpoint = endpoint;
            }
        }
        if let Ok(period) = std::env::var("GESTURE_PERIOD_MS") {
            self.scheduler.period_ms = period
                .trim()
                .parse()
                .map_err(|_| anyhow!("GESTURE_PERIOD_MS must be an integer number of milliseconds"))?;
        }
        if let Ok(mode) = std::env::var("GESTURE_MODE") {
            if !mode.trim().is_empty() {
                self.scheduler.mode = mode.parse()?;
            }
        }
        if let Ok(timeout) = std::env::var("GESTURE_TIMEOUT_MS") {
            self.recognition.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| anyhow!("GESTURE_TIMEOUT_MS must be an integer number of milliseconds"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.period_ms == 0 {
            return Err(anyhow!("scheduler period_ms must be greater than zero"));
        }
        if self.recognition.timeout_ms == 0 {
            return Err(anyhow!("recognition timeout_ms must be greater than zero"));
        }
        if !(1..=100).contains(&self.normalize.jpeg_quality) {
            return Err(anyhow!(
                "normalize jpeg_quality must be 1-100 (got {})",
                self.normalize.jpeg_quality
            ));
        }
        if self.normalize.output_size == 0 {
            return Err(anyhow!("normalize output_size must be greater than zero"));
        }
        self.motion.validate()?;
        if self.source.uri.trim().is_empty() {
            return Err(anyhow!("source uri must not be empty"));
        }
        validate_endpoint(&self.recognition.endpoint)?;
        if let Some(letters) = &self.recognition.letters_endpoint {
            validate_endpoint(letters)?;
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            mode: self.scheduler.mode,
            motion: self.motion,
            normalize: self.normalize,
            fallback_to_full_frame: self.scheduler.fallback_to_full_frame,
            period: self.scheduler.period(),
        }
    }
}

fn validate_endpoint(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| anyhow!("invalid endpoint {}: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" | "stub" => Ok(()),
        other => Err(anyhow!(
            "endpoint {} must use http, https or stub (got {})",
            raw,
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
