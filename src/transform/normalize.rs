//! Min/max normalization into the 8-bit domain.

use image::{GrayImage, ImageFormat};
use std::io::Cursor;

/// A normalized 8-bit grayscale image.
#[derive(Clone, PartialEq)]
pub struct NormalizedImage {
    /// 8-bit samples, row-major.
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl NormalizedImage {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns true if every sample has the same value.
    pub fn is_uniform(&self) -> bool {
        self.pixels.windows(2).all(|w| w[0] == w[1])
    }

    /// Encodes the image as a lossless 8-bit grayscale PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let gray = GrayImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(
            || {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            },
        )?;

        let mut buffer = Vec::new();
        gray.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

/// Maps a floating-point grid onto `[0, 255]`.
///
/// Subtracts the global minimum, divides by the resulting maximum and
/// scales by 255. A zero range produces an all-zero grid.
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, values: &[f64], width: u32, height: u32) -> NormalizedImage {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let pixels = if values.is_empty() || max == min {
            vec![0u8; values.len()]
        } else {
            // Halved so the span of any two finite values stays finite.
            let half_min = min / 2.0;
            let half_range = max / 2.0 - half_min;
            values
                .iter()
                .map(|&v| ((v / 2.0 - half_min) / half_range * 255.0).clamp(0.0, 255.0) as u8)
                .collect()
        };

        NormalizedImage::new(pixels, width, height)
    }
}
