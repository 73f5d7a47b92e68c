//! Decoder abstraction for raster sources.
//!
//! This module provides a trait-based abstraction over raster file
//! formats, allowing for both the DICOM decoder and mock implementations
//! for testing.

use super::{ImageTags, RawImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors that can occur while decoding a raster file.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read raster file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed raster file: {0}")]
    Malformed(String),
    #[error("unsupported raster encoding: {0}")]
    Unsupported(String),
}

/// Trait for raster decoders.
///
/// Implementations must be shareable across worker threads; the driver
/// calls `decode` concurrently when more than one worker is configured.
pub trait RasterDecoder: Send + Sync {
    /// Decodes the file at `path` into a sample grid plus tags.
    fn decode(&self, path: &Path) -> Result<RawImage, DecodeError>;
}

/// Mock decoder for testing that builds grids from file bytes.
///
/// Every byte of the source file becomes one sample, cycled to fill a
/// `width` x `height` grid. Empty files fail to decode, which makes it
/// easy to plant corrupt inputs in a test tree.
#[derive(Debug)]
pub struct MockDecoder {
    width: u32,
    height: u32,
    tags: ImageTags,
    decodes: AtomicUsize,
}

impl MockDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tags: ImageTags::default(),
            decodes: AtomicUsize::new(0),
        }
    }

    /// Attaches tags to every decoded image.
    pub fn with_tags(mut self, tags: ImageTags) -> Self {
        self.tags = tags;
        self
    }

    /// Returns how many decode attempts have been made.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::new(8, 8)
    }
}

impl RasterDecoder for MockDecoder {
    fn decode(&self, path: &Path) -> Result<RawImage, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);

        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(DecodeError::Malformed(format!(
                "{} is empty",
                path.display()
            )));
        }

        let count = (self.width as usize) * (self.height as usize);
        let samples = bytes.iter().cycle().take(count).map(|&b| b as i32).collect();

        Ok(RawImage::new(
            samples,
            self.width,
            self.height,
            self.tags.clone(),
        ))
    }
}
