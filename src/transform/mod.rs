//! Pixel transform pipeline.
//!
//! This module converts a decoded sample grid into a normalized 8-bit
//! grid. It applies the stages in a fixed order:
//!
//! ```text
//! cast → rescale → window (optional) → normalize → truncate
//! ```
//!
//! The transform has no side effects; failures are returned per image
//! and never abort a batch.

mod normalize;
mod rescale;
mod window;

pub use normalize::{NormalizedImage, Normalizer};
pub use rescale::Rescale;
pub use window::{Window, WindowSelection};

use crate::raster::RawImage;
use thiserror::Error;

/// Errors that can occur while transforming a single image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("image has no samples")]
    EmptyImage,
    #[error("sample count {actual} does not match {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
    #[error("invalid rescale slope {slope} / intercept {intercept}")]
    InvalidRescale { slope: f64, intercept: f64 },
    #[error("non-finite sample value after rescale")]
    NonFinite,
    #[error("invalid window center {center} / width {width}")]
    InvalidWindow { center: f64, width: f64 },
    #[error("window tag has no value at position {index} ({available} stored)")]
    MissingWindowValue { index: usize, available: usize },
}

/// Converts raw images into normalized 8-bit images.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    selection: WindowSelection,
    normalizer: Normalizer,
}

impl Transformer {
    pub fn new(selection: WindowSelection) -> Self {
        Self {
            selection,
            normalizer: Normalizer::new(),
        }
    }

    /// Returns the multi-valued window selection policy.
    pub fn selection(&self) -> WindowSelection {
        self.selection
    }

    /// Runs the full pipeline on one image.
    pub fn transform(&self, image: &RawImage) -> Result<NormalizedImage, TransformError> {
        let values = self.windowed_values(image)?;
        Ok(self
            .normalizer
            .normalize(&values, image.width(), image.height()))
    }

    /// Runs the stages before normalization and returns the
    /// floating-point grid.
    pub fn windowed_values(&self, image: &RawImage) -> Result<Vec<f64>, TransformError> {
        if image.samples().is_empty() {
            return Err(TransformError::EmptyImage);
        }
        if !image.is_valid() {
            return Err(TransformError::DimensionMismatch {
                width: image.width(),
                height: image.height(),
                actual: image.samples().len(),
            });
        }

        let rescale = Rescale::from_tags(image.tags())?;
        let mut values = rescale.apply(image.samples())?;

        if let Some(window) = Window::from_tags(image.tags(), self.selection)? {
            window.clip(&mut values);
            tracing::trace!(
                center = window.center(),
                width = window.width(),
                "Applied window"
            );
        }

        Ok(values)
    }
}
