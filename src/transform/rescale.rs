//! Linear rescale from stored values to physical units.

use super::TransformError;
use crate::raster::ImageTags;

/// Linear rescale `value * slope + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    slope: f64,
    intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl Rescale {
    /// Builds the rescale from tags, defaulting absent values to 1 and 0.
    pub fn from_tags(tags: &ImageTags) -> Result<Self, TransformError> {
        let slope = tags.rescale_slope.unwrap_or(1.0);
        let intercept = tags.rescale_intercept.unwrap_or(0.0);

        if !slope.is_finite() || !intercept.is_finite() {
            return Err(TransformError::InvalidRescale { slope, intercept });
        }

        Ok(Self { slope, intercept })
    }

    /// Casts samples to floating point and applies the rescale.
    pub fn apply(&self, samples: &[i32]) -> Result<Vec<f64>, TransformError> {
        let values: Vec<f64> = samples
            .iter()
            .map(|&s| f64::from(s) * self.slope + self.intercept)
            .collect();

        if values.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite);
        }

        Ok(values)
    }

    /// Returns true if the rescale leaves values unchanged.
    pub fn is_identity(&self) -> bool {
        self.slope == 1.0 && self.intercept == 0.0
    }
}
