//! Decoded RGBA8 pixel buffers used to fill textures.

use std::path::Path;
use crate::error::{GpuError, Result};
use crate::types::Size;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(GpuError::config(
                "image",
                format!("{width}x{height} RGBA image needs {expected} bytes, got {}", rgba.len()),
            ));
        }
        Ok(Self { width, height, rgba })
    }

    /// A single-colour image.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = width.max(1) as usize * height.max(1) as usize;
        Self {
            width: width.max(1),
            height: height.max(1),
            rgba: color.repeat(pixels),
        }
    }

    pub fn from_dynamic_image(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        }
    }

    /// Decode an image file (PNG).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|e| GpuError::config(format!("image {}", path.display()), e.to_string()))?;
        Ok(Self::from_dynamic_image(&decoded))
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        assert!(ImageData::new(2, 2, vec![0; 15]).is_err());
        assert!(ImageData::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn solid_fills_every_pixel() {
        let image = ImageData::solid(3, 2, [1, 2, 3, 4]);
        assert_eq!(image.rgba.len(), 24);
        assert_eq!(&image.rgba[20..24], &[1, 2, 3, 4]);
    }

    #[test]
    fn converts_dynamic_image() {
        let source = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(2, 1, image::Rgba([9, 8, 7, 6])));
        let image = ImageData::from_dynamic_image(&source);
        assert_eq!(image.size(), Size::new(2, 1));
        assert_eq!(image.rgba, vec![9, 8, 7, 6, 9, 8, 7, 6]);
    }
}
