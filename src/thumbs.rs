//! Lumen Vault - Preview Generation
//!
//! Bounded-dimension JPEG previews for imported media. Previews are
//! generated from plaintext during import and stored encrypted next to
//! the content ciphertext.

use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::error::{VaultError, VaultResult};

/// Longest preview edge in pixels
pub const PREVIEW_MAX_DIMENSION: u32 = 512;

/// Preview engine
pub struct PreviewEngine {
    max_dimension: u32,
}

impl PreviewEngine {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Generate a preview from raw image bytes, keeping the aspect
    /// ratio within `max_dimension`. Fails on bytes `image` cannot
    /// decode (video containers, unknown formats).
    pub fn generate(&self, image_data: &[u8]) -> VaultResult<Vec<u8>> {
        let img = image::load_from_memory(image_data)
            .map_err(|e| VaultError::InvalidFileFormat(e.to_string()))?;

        let preview = self.resize_to_preview(&img);

        // JPEG keeps previews small; flatten alpha first since the
        // encoder rejects RGBA.
        let rgb = DynamicImage::ImageRgb8(preview.to_rgb8());
        let mut output = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg)?;

        Ok(output)
    }

    fn resize_to_preview(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let max = self.max_dimension;

        if width <= max && height <= max {
            return img.clone();
        }

        let (new_width, new_height) = if width > height {
            let ratio = max as f32 / width as f32;
            (max, ((height as f32 * ratio) as u32).max(1))
        } else {
            let ratio = max as f32 / height as f32;
            (((width as f32 * ratio) as u32).max(1), max)
        };

        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

impl Default for PreviewEngine {
    fn default() -> Self {
        Self::new(PREVIEW_MAX_DIMENSION)
    }
}
