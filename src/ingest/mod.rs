//! Frame sources.
//!
//! Every source is pull-based: the capture pipeline asks for the current
//! frame when a tick runs and gets `None` while the feed is not ready yet.
//! Sources are opened from a URI:
//!
//! - `stub://static`, `stub://wave`: synthetic scenes for tests and demos
//! - `http://…`, `https://…`: JPEG snapshot endpoints
//! - `file:///dir` or a plain directory path: still images cycled in name order
//!
//! Whatever the wire format, sources hand out RGB `PixelBuffer`s.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use url::Url;

use crate::frame::PixelBuffer;

pub mod normalize;
mod snapshot;
mod stills;
mod synthetic;

pub use normalize::PixelFormat;
pub use snapshot::SnapshotSource;
pub use stills::StillsSource;
pub use synthetic::{SyntheticScene, SyntheticSource};

/// Live feed the capture pipeline pulls frames from.
pub trait FrameSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Open the feed. Pulls before a successful connect yield nothing.
    fn connect(&mut self) -> Result<()>;

    /// Whether the feed is open and expected to deliver frames.
    fn is_active(&self) -> bool;

    /// The frame currently on the feed, or `None` when none is ready yet.
    fn current_frame(&mut self) -> Result<Option<PixelBuffer>>;
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub uri: String,
    /// Frame size for synthetic sources. Real feeds report their own.
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://wave".to_string(),
            width: 320,
            height: 240,
        }
    }
}

/// Build the source named by `config.uri`. The source is not connected yet.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let uri = config.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("frame source uri must not be empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_uri(
            uri,
            config.width,
            config.height,
        )?));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Box::new(SnapshotSource::new(uri)?));
    }
    if uri.starts_with("file://") {
        let url = Url::parse(uri).map_err(|e| anyhow!("invalid file uri {}: {}", uri, e))?;
        let path = url
            .to_file_path()
            .map_err(|_| anyhow!("file uri {} has no local path", uri))?;
        return Ok(Box::new(StillsSource::new(path)));
    }
    if uri.contains("://") {
        return Err(anyhow!("unsupported frame source uri: {}", uri));
    }
    Ok(Box::new(StillsSource::new(uri.into())))
}
