//! Display windowing.
//!
//! A window `(center, width)` clips values to
//! `[center - width/2, center + width/2]` so the normalization step maps
//! that range to full contrast.

use super::TransformError;
use crate::raster::{ImageTags, WindowValue};
use serde::{Deserialize, Serialize};

/// Which element of a multi-valued window tag to use.
///
/// Single-valued tags are used as-is under every policy except `Ignore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSelection {
    /// First stored value.
    #[default]
    First,
    /// Last stored value.
    Last,
    /// Value at a fixed position.
    Index(usize),
    /// Never window.
    Ignore,
}

impl WindowSelection {
    fn pick(&self, value: &WindowValue) -> Result<f64, TransformError> {
        let values = value.values();
        let index = match self {
            WindowSelection::First | WindowSelection::Ignore => 0,
            WindowSelection::Last => values.len().saturating_sub(1),
            WindowSelection::Index(i) => match value {
                WindowValue::Single(_) => 0,
                WindowValue::Multi(_) => *i,
            },
        };
        values
            .get(index)
            .copied()
            .ok_or(TransformError::MissingWindowValue {
                index,
                available: values.len(),
            })
    }
}

/// A resolved display window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    center: f64,
    width: f64,
}

impl Window {
    /// Creates a window, rejecting non-positive or non-finite parameters.
    pub fn new(center: f64, width: f64) -> Result<Self, TransformError> {
        if !center.is_finite() || !width.is_finite() || width <= 0.0 {
            return Err(TransformError::InvalidWindow { center, width });
        }
        Ok(Self { center, width })
    }

    /// Resolves the window from tags.
    ///
    /// Returns `None` unless both center and width are present.
    pub fn from_tags(
        tags: &ImageTags,
        selection: WindowSelection,
    ) -> Result<Option<Self>, TransformError> {
        if selection == WindowSelection::Ignore {
            return Ok(None);
        }
        match (&tags.window_center, &tags.window_width) {
            (Some(center), Some(width)) => {
                Self::new(selection.pick(center)?, selection.pick(width)?).map(Some)
            }
            _ => Ok(None),
        }
    }

    #[inline]
    pub fn center(&self) -> f64 {
        self.center
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Returns the `(lower, upper)` clip bounds.
    pub fn bounds(&self) -> (f64, f64) {
        let half = self.width / 2.0;
        (self.center - half, self.center + half)
    }

    /// Clips every value into the window bounds.
    pub fn clip(&self, values: &mut [f64]) {
        let (lower, upper) = self.bounds();
        for v in values.iter_mut() {
            *v = v.clamp(lower, upper);
        }
    }
}
