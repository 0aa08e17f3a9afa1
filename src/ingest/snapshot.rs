//! HTTP snapshot source.
//!
//! Each pull fetches one JPEG (or PNG) from the configured URL, so the frame
//! rate is bounded by the capture cadence rather than the camera.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use super::FrameSource;
use crate::frame::PixelBuffer;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

pub struct SnapshotSource {
    url: String,
    agent: ureq::Agent,
    connected: bool,
    frame_count: u64,
    last_error: Option<String>,
}

impl SnapshotSource {
    pub fn new(url: &str) -> Result<Self> {
        url::Url::parse(url).with_context(|| format!("invalid snapshot url {}", url))?;
        Ok(Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build(),
            connected: false,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fetch(&self) -> Result<PixelBuffer> {
        let bytes = fetch_snapshot(&self.agent, &self.url)?;
        decode_snapshot(&bytes)
    }
}

impl FrameSource for SnapshotSource {
    fn describe(&self) -> String {
        format!("{} (http snapshot)", self.url)
    }

    fn connect(&mut self) -> Result<()> {
        let frame = self
            .fetch()
            .with_context(|| format!("connect to snapshot source {}", self.url))?;
        log::info!(
            "SnapshotSource: connected to {} ({}x{})",
            self.url,
            frame.width(),
            frame.height()
        );
        self.connected = true;
        self.last_error = None;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.connected
    }

    fn current_frame(&mut self) -> Result<Option<PixelBuffer>> {
        if !self.connected {
            return Ok(None);
        }
        match self.fetch() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_error = None;
                Ok(Some(frame))
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_SNAPSHOT_BYTES)
        .read_to_end(&mut bytes)
        .context("read snapshot body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot from {}", url));
    }
    Ok(bytes)
}

fn decode_snapshot(bytes: &[u8]) -> Result<PixelBuffer> {
    let image = image::load_from_memory(bytes).context("decode snapshot")?;
    let rgb = image.into_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(anyhow!("snapshot has zero dimensions"));
    }
    Ok(PixelBuffer::from_image(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_snapshot(b"definitely not a jpeg").is_err());
    }

    #[test]
    fn decode_accepts_png() -> Result<()> {
        let image = image::RgbImage::from_pixel(5, 3, image::Rgb([9, 8, 7]));
        let mut bytes = Vec::new();
        image.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        let frame = decode_snapshot(&bytes)?;
        assert_eq!(frame.dimensions(), (5, 3));
        assert_eq!(frame.pixel(4, 2), Some([9, 8, 7]));
        Ok(())
    }

    #[test]
    fn unconnected_source_yields_nothing() -> Result<()> {
        let mut source = SnapshotSource::new("http://127.0.0.1:9/snapshot.jpg")?;
        assert!(!source.is_active());
        assert!(source.current_frame()?.is_none());
        Ok(())
    }
}
