//! Turning a card image into a thumbnail artifact.

use crate::config::ThumbnailConfig;
use crate::error::{CardSyncError, Result};
use crate::metadata::atomic_write_bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::path::Path;

/// Produces the artifact at `dest` from the image at `source`.
///
/// Called on a blocking thread.
pub trait ThumbnailGenerator: Send + Sync + 'static {
    fn generate(&self, source: &Path, dest: &Path) -> Result<()>;
}

/// Downscales to fit a square bound and writes a JPEG.
#[derive(Debug, Clone)]
pub struct ImageThumbnailGenerator {
    max_edge: u32,
    quality: u8,
}

impl ImageThumbnailGenerator {
    pub fn new(max_edge: u32, quality: u8) -> Self {
        Self {
            max_edge: max_edge.max(1),
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for ImageThumbnailGenerator {
    fn default() -> Self {
        Self::new(ThumbnailConfig::MAX_EDGE, ThumbnailConfig::JPEG_QUALITY)
    }
}

impl ThumbnailGenerator for ImageThumbnailGenerator {
    fn generate(&self, source: &Path, dest: &Path) -> Result<()> {
        let img = image::open(source).map_err(|e| {
            CardSyncError::Other(format!("failed to decode {}: {}", source.display(), e))
        })?;

        let img = if img.width() > self.max_edge || img.height() > self.max_edge {
            img.thumbnail(self.max_edge, self.max_edge)
        } else {
            img
        };
        // JPEG carries no alpha.
        let rgb = img.to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8.into())
            .map_err(|e| {
                CardSyncError::Other(format!("failed to encode thumbnail for {}: {}", source.display(), e))
            })?;

        atomic_write_bytes(dest, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_image(path: &Path, width: u32, height: u32) {
        image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 128]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_downscales_preserving_aspect() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("card.png");
        let dest = temp.path().join("thumbs").join("card.jpg");
        write_image(&source, 400, 200);

        ImageThumbnailGenerator::new(100, 80)
            .generate(&source, &dest)
            .unwrap();

        let thumb = image::open(&dest).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (100, 50));
    }

    #[test]
    fn test_small_images_are_not_upscaled() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("card.png");
        let dest = temp.path().join("card.jpg");
        write_image(&source, 20, 30);

        ImageThumbnailGenerator::new(100, 80)
            .generate(&source, &dest)
            .unwrap();

        let thumb = image::open(&dest).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (20, 30));
    }

    #[test]
    fn test_undecodable_source_fails() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("card.png");
        let dest = temp.path().join("card.jpg");
        std::fs::write(&source, b"not an image").unwrap();

        assert!(ImageThumbnailGenerator::default()
            .generate(&source, &dest)
            .is_err());
        assert!(!dest.exists());
    }
}
