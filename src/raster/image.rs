//! Decoded raster type: a sample grid with its display tags.

/// A window tag value, which archives store either as a single number
/// or as an ordered list of alternatives.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowValue {
    /// A single value.
    Single(f64),
    /// Several values in stored order.
    Multi(Vec<f64>),
}

impl WindowValue {
    /// Builds a window value from a decoded list of numbers.
    ///
    /// Returns `None` for an empty list.
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(WindowValue::Single),
            _ => Some(WindowValue::Multi(values)),
        }
    }

    /// Returns all stored values in order.
    pub fn values(&self) -> &[f64] {
        match self {
            WindowValue::Single(v) => std::slice::from_ref(v),
            WindowValue::Multi(vs) => vs,
        }
    }
}

impl From<f64> for WindowValue {
    fn from(value: f64) -> Self {
        WindowValue::Single(value)
    }
}

/// Numeric tags that drive the pixel transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageTags {
    /// Linear rescale slope (absent means 1).
    pub rescale_slope: Option<f64>,
    /// Linear rescale intercept (absent means 0).
    pub rescale_intercept: Option<f64>,
    /// Display window center.
    pub window_center: Option<WindowValue>,
    /// Display window width.
    pub window_width: Option<WindowValue>,
}

impl ImageTags {
    /// Tags carrying a single-valued window.
    pub fn with_window(center: f64, width: f64) -> Self {
        Self {
            window_center: Some(WindowValue::Single(center)),
            window_width: Some(WindowValue::Single(width)),
            ..Default::default()
        }
    }

    /// Tags carrying only a rescale.
    pub fn with_rescale(slope: f64, intercept: f64) -> Self {
        Self {
            rescale_slope: Some(slope),
            rescale_intercept: Some(intercept),
            ..Default::default()
        }
    }
}

/// A decoded raster image.
///
/// Holds stored sample values row-major, before any rescale. It is
/// transient: the driver drops it as soon as the transform returns.
#[derive(Clone)]
pub struct RawImage {
    /// Stored sample values, row-major.
    samples: Vec<i32>,
    /// Grid width in samples.
    width: u32,
    /// Grid height in samples.
    height: u32,
    /// Display and rescale tags.
    tags: ImageTags,
}

impl RawImage {
    /// Creates a new image from a row-major sample grid.
    pub fn new(samples: Vec<i32>, width: u32, height: u32, tags: ImageTags) -> Self {
        Self {
            samples,
            width,
            height,
            tags,
        }
    }

    /// Returns the stored samples.
    #[inline]
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Returns the grid width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the grid height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the tags.
    #[inline]
    pub fn tags(&self) -> &ImageTags {
        &self.tags
    }

    /// Returns the expected number of samples (width * height).
    #[inline]
    pub fn sample_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the sample buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.samples.len() == self.sample_count()
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("samples", &self.samples.len())
            .field("tags", &self.tags)
            .finish()
    }
}
