//! Texture decoding for pack resources
//!
//! Texture resources are stored as encoded images (PNG) inside a resource
//! pack. [`ImageData::from_bytes`] turns the raw resource bytes into tightly
//! packed RGBA8 pixels ready for upload.

use std::io::Cursor;

use crate::assets::AssetError;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Row-major RGBA pixel data, `width * height * 4` bytes
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageData {
    /// Bytes per pixel of the decoded data
    pub const CHANNELS: usize = 4;

    /// Decode an encoded image held in memory, converting to RGBA8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes).map_err(|e| AssetError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Decoded texture {}x{} ({} encoded bytes)", width, height, bytes.len());
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Single-color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            data: color.repeat(pixels),
            width,
            height,
        }
    }

    /// Two-color checkerboard with `cell`-pixel squares
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity(size as usize * size as usize * Self::CHANNELS);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
                data.extend_from_slice(&color);
            }
        }
        Self {
            data,
            width: size,
            height: size,
        }
    }

    /// Encode as PNG, e.g. to store in a pack
    pub fn encode_png(&self) -> Result<Vec<u8>, AssetError> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            AssetError::InvalidData(format!(
                "{} bytes do not fill a {}x{} RGBA image",
                self.data.len(),
                self.width,
                self.height
            ))
        })?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| AssetError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Whether both dimensions are powers of two
    pub const fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 2, [255, 0, 0, 255]);
        assert_eq!(img.size_bytes(), 4 * 2 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
        assert!(img.is_power_of_two());
        assert!(!ImageData::solid_color(3, 4, [0; 4]).is_power_of_two());
    }

    #[test]
    fn test_png_round_trip() {
        let img = ImageData::checkerboard(8, 2, [0, 0, 0, 255], [255, 255, 255, 255]);
        let png = img.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(ImageData::from_bytes(&png).unwrap(), img);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(matches!(
            ImageData::from_bytes(b"definitely not an image"),
            Err(AssetError::Decode(_))
        ));
    }

    #[test]
    fn test_short_pixel_buffer_rejected() {
        let img = ImageData {
            data: vec![0; 3],
            width: 2,
            height: 2,
        };
        assert!(matches!(img.encode_png(), Err(AssetError::InvalidData(_))));
    }
}
