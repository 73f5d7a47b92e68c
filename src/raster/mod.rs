//! Raster input and decoded sample grids.
//!
//! This module provides abstractions for decoding archived raster files
//! into a raw sample grid plus the numeric tags the transform needs.
//! Decoders do not interpret the samples; that is the transform's job.

mod decoder;
mod dicom;
mod image;

pub use decoder::{DecodeError, MockDecoder, RasterDecoder};
pub use dicom::DicomDecoder;
pub use image::{ImageTags, RawImage, WindowValue};
