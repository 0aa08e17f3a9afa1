//! Directory of still images, cycled in file-name order.
//!
//! Useful for replaying a recorded gesture without a camera. Each pull
//! decodes the next image; after the last one it wraps around.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::normalize::PixelFormat;
use super::FrameSource;
use crate::frame::PixelBuffer;

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct StillsSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl StillsSource {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Vec::new(),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for StillsSource {
    fn describe(&self) -> String {
        format!("{} (still images)", self.dir.display())
    }

    fn connect(&mut self) -> Result<()> {
        let files = list_images(&self.dir)?;
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "StillsSource: {} images in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.files.is_empty()
    }

    fn current_frame(&mut self) -> Result<Option<PixelBuffer>> {
        let Some(path) = self.files.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next = (self.next + 1) % self.files.len();
        load_still(&path).map(Some)
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read image dir {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.context("read image dir entry")?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_still(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)
        .with_context(|| format!("decode {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    PixelBuffer::from_raw(image.as_raw(), width, height, PixelFormat::Rgba32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) -> Result<()> {
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb(rgb));
        image.save(dir.join(name))?;
        Ok(())
    }

    #[test]
    fn cycles_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "b.png", [0, 255, 0])?;
        write_png(dir.path(), "a.png", [255, 0, 0])?;
        std::fs::write(dir.path().join("notes.txt"), "not an image")?;

        let mut source = StillsSource::new(dir.path().to_path_buf());
        assert!(!source.is_active());
        source.connect()?;
        assert_eq!(source.len(), 2);

        let first = source.current_frame()?.expect("frame");
        let second = source.current_frame()?.expect("frame");
        let third = source.current_frame()?.expect("frame");
        assert_eq!(first.pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(second.pixel(0, 0), Some([0, 255, 0]));
        assert_eq!(third.pixel(0, 0), Some([255, 0, 0]));
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = StillsSource::new(dir.path().to_path_buf());
        assert!(source.connect().is_err());
        assert!(!source.is_active());
        Ok(())
    }
}
