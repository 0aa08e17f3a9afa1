//! Synthetic frame source (`stub://`) for tests and offline demos.
//!
//! `stub://static` renders the same background every pull. `stub://wave`
//! renders that background plus a hand-sized block sweeping left to right
//! and back, so the motion detector has something to find.
//!
//! Optional query parameters:
//! - `noise=N` adds uniform per-channel noise in `[-N, N]`
//! - `seed=S` seeds the noise generator (default 0)

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use url::Url;

use super::FrameSource;
use crate::frame::PixelBuffer;

const BLOCK_COLOR: [u8; 3] = [222, 184, 150];
const BLOCK_STEP_PX: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticScene {
    Static,
    Wave,
}

pub struct SyntheticSource {
    uri: String,
    scene: SyntheticScene,
    width: u32,
    height: u32,
    noise: u8,
    rng: StdRng,
    background: Option<PixelBuffer>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(scene: SyntheticScene, width: u32, height: u32) -> Self {
        Self {
            uri: match scene {
                SyntheticScene::Static => "stub://static".to_string(),
                SyntheticScene::Wave => "stub://wave".to_string(),
            },
            scene,
            width,
            height,
            noise: 0,
            rng: StdRng::seed_from_u64(0),
            background: None,
            frame_count: 0,
            connected: false,
        }
    }

    pub fn from_uri(uri: &str, width: u32, height: u32) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| anyhow!("invalid stub uri {}: {}", uri, e))?;
        let scene = match url.host_str() {
            Some("static") | None => SyntheticScene::Static,
            Some("wave") => SyntheticScene::Wave,
            Some(other) => return Err(anyhow!("unknown synthetic scene: {}", other)),
        };
        let mut source = Self::new(scene, width, height);
        source.uri = uri.to_string();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "noise" => {
                    source.noise = value
                        .parse()
                        .map_err(|_| anyhow!("stub noise must be 0-255, got {}", value))?;
                }
                "seed" => {
                    let seed: u64 = value
                        .parse()
                        .map_err(|_| anyhow!("stub seed must be an integer, got {}", value))?;
                    source.rng = StdRng::seed_from_u64(seed);
                }
                other => log::warn!("ignoring unknown stub parameter {}", other),
            }
        }
        Ok(source)
    }

    pub fn scene(&self) -> SyntheticScene {
        self.scene
    }

    fn background(&mut self) -> Result<PixelBuffer> {
        if let Some(background) = &self.background {
            return Ok(background.clone());
        }
        let (width, height) = (self.width, self.height);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                // Soft vertical gradient with a faint horizontal ramp.
                let shade = 60 + (y * 80 / height.max(1)) as u8;
                let tint = (x * 20 / width.max(1)) as u8;
                pixels.extend_from_slice(&[shade, shade.saturating_add(tint), shade]);
            }
        }
        let background = PixelBuffer::from_rgb(pixels, width, height)?;
        self.background = Some(background.clone());
        Ok(background)
    }

    fn block_origin(&self) -> (u32, u32, u32) {
        let side = (self.width.min(self.height) / 4).max(1);
        let travel = self.width.saturating_sub(side).max(1);
        let span = (self.frame_count as u32).wrapping_mul(BLOCK_STEP_PX) % (2 * travel);
        let x = if span < travel { span } else { 2 * travel - span };
        let y = self.height.saturating_sub(side) / 2;
        (x, y, side)
    }

    fn add_noise(&mut self, frame: &PixelBuffer) -> Result<PixelBuffer> {
        let amplitude = self.noise as i16;
        let pixels = frame
            .as_rgb()
            .iter()
            .map(|&v| {
                let delta: i16 = self.rng.gen_range(-amplitude..=amplitude);
                (v as i16 + delta).clamp(0, 255) as u8
            })
            .collect();
        PixelBuffer::from_rgb(pixels, frame.width(), frame.height())
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} ({}x{} synthetic)", self.uri, self.width, self.height)
    }

    fn connect(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "synthetic source needs non-zero dimensions (got {}x{})",
                self.width,
                self.height
            ));
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.uri);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.connected
    }

    fn current_frame(&mut self) -> Result<Option<PixelBuffer>> {
        if !self.connected {
            return Ok(None);
        }
        let background = self.background()?;
        let frame = match self.scene {
            SyntheticScene::Static => background,
            SyntheticScene::Wave => {
                let (x, y, side) = self.block_origin();
                background.with_block(x, y, side, side, BLOCK_COLOR)
            }
        };
        self.frame_count += 1;
        if self.noise == 0 {
            return Ok(Some(frame));
        }
        self.add_noise(&frame).map(Some)
    }
}
