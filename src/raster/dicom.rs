//! DICOM decoding for single-channel, uncompressed pixel data.
//!
//! Only the attributes the transform needs are read. Encapsulated
//! (compressed) pixel data and multi-sample pixels are reported as
//! unsupported; multi-frame objects contribute their first frame.

use super::{DecodeError, ImageTags, RasterDecoder, RawImage, WindowValue};
use dicom_core::value::{DicomValueType, PrimitiveValue, Value};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject};
use std::path::Path;

/// How stored samples are packed.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PixelLayout {
    bits_allocated: u16,
    bits_stored: u16,
    signed: bool,
}

impl PixelLayout {
    fn validate(&self) -> Result<(), DecodeError> {
        if !matches!(self.bits_allocated, 8 | 16 | 32) {
            return Err(DecodeError::Unsupported(format!(
                "{} bits allocated",
                self.bits_allocated
            )));
        }
        if self.bits_stored == 0 || self.bits_stored > self.bits_allocated {
            return Err(DecodeError::Malformed(format!(
                "{} bits stored with {} allocated",
                self.bits_stored, self.bits_allocated
            )));
        }
        if self.bits_stored == 32 && !self.signed {
            return Err(DecodeError::Unsupported(
                "unsigned 32-bit samples".to_string(),
            ));
        }
        Ok(())
    }

    /// Masks a raw word to the stored bits and sign-extends it.
    fn interpret(&self, raw: u32) -> i32 {
        let bits = u32::from(self.bits_stored);
        if bits >= 32 {
            return raw as i32;
        }
        let value = raw & ((1u32 << bits) - 1);
        if self.signed && (value >> (bits - 1)) & 1 == 1 {
            (i64::from(value) - (1i64 << bits)) as i32
        } else {
            value as i32
        }
    }
}

/// Decoder for DICOM files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomDecoder;

impl DicomDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RasterDecoder for DicomDecoder {
    fn decode(&self, path: &Path) -> Result<RawImage, DecodeError> {
        let obj = open_file(path).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let image = image_from_object(&obj)?;

        tracing::trace!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Decoded DICOM pixel data"
        );
        Ok(image)
    }
}

/// Extracts the first frame and the transform tags from a parsed object.
fn image_from_object(obj: &DefaultDicomObject) -> Result<RawImage, DecodeError> {
    let samples_per_pixel = optional_u16(obj, tags::SAMPLES_PER_PIXEL)?.unwrap_or(1);
    if samples_per_pixel != 1 {
        return Err(DecodeError::Unsupported(format!(
            "{samples_per_pixel} samples per pixel"
        )));
    }

    let rows = required_u16(obj, tags::ROWS, "Rows")?;
    let columns = required_u16(obj, tags::COLUMNS, "Columns")?;
    if rows == 0 || columns == 0 {
        return Err(DecodeError::Malformed(format!(
            "empty grid {columns}x{rows}"
        )));
    }

    let bits_allocated = required_u16(obj, tags::BITS_ALLOCATED, "BitsAllocated")?;
    let layout = PixelLayout {
        bits_allocated,
        bits_stored: optional_u16(obj, tags::BITS_STORED)?.unwrap_or(bits_allocated),
        signed: optional_u16(obj, tags::PIXEL_REPRESENTATION)?.unwrap_or(0) == 1,
    };
    layout.validate()?;

    let pixel_data = obj
        .element(tags::PIXEL_DATA)
        .map_err(|_| DecodeError::Malformed("no pixel data".to_string()))?;
    let primitive = match pixel_data.value() {
        Value::Primitive(p) => p,
        _ => {
            return Err(DecodeError::Unsupported(
                "encapsulated pixel data".to_string(),
            ))
        }
    };

    let count = usize::from(rows) * usize::from(columns);
    let samples = unpack_samples(primitive, &layout, count)?;

    let image_tags = ImageTags {
        rescale_slope: optional_f64(obj, tags::RESCALE_SLOPE),
        rescale_intercept: optional_f64(obj, tags::RESCALE_INTERCEPT),
        window_center: optional_window(obj, tags::WINDOW_CENTER),
        window_width: optional_window(obj, tags::WINDOW_WIDTH),
    };

    tracing::trace!(
        rows,
        columns,
        bits_allocated = layout.bits_allocated,
        signed = layout.signed,
        "Unpacked pixel data"
    );

    Ok(RawImage::new(
        samples,
        u32::from(columns),
        u32::from(rows),
        image_tags,
    ))
}

fn required_u16(obj: &DefaultDicomObject, tag: Tag, name: &str) -> Result<u16, DecodeError> {
    optional_u16(obj, tag)?.ok_or_else(|| DecodeError::Malformed(format!("missing {name}")))
}

fn optional_u16(obj: &DefaultDicomObject, tag: Tag) -> Result<Option<u16>, DecodeError> {
    match obj.element(tag) {
        Ok(elem) => elem
            .to_int::<u16>()
            .map(Some)
            .map_err(|e| DecodeError::Malformed(format!("{tag}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Unreadable optional tags are treated as absent.
fn optional_f64(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn optional_window(obj: &DefaultDicomObject, tag: Tag) -> Option<WindowValue> {
    let values = obj.element(tag).ok()?.to_multi_float64().ok()?;
    WindowValue::from_values(values)
}

fn unpack_samples(
    value: &PrimitiveValue,
    layout: &PixelLayout,
    count: usize,
) -> Result<Vec<i32>, DecodeError> {
    let words: Vec<u32> = match (value, layout.bits_allocated) {
        (PrimitiveValue::U8(bytes), 8) => bytes.iter().take(count).map(|&b| u32::from(b)).collect(),
        (PrimitiveValue::U8(bytes), 16) => bytes
            .chunks_exact(2)
            .take(count)
            .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
            .collect(),
        (PrimitiveValue::U8(bytes), 32) => bytes
            .chunks_exact(4)
            .take(count)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        (PrimitiveValue::U16(words), 16) => words.iter().take(count).map(|&w| u32::from(w)).collect(),
        (PrimitiveValue::I16(words), 16) => words
            .iter()
            .take(count)
            .map(|&w| u32::from(w as u16))
            .collect(),
        (PrimitiveValue::U16(words), 8) => words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(count)
            .map(u32::from)
            .collect(),
        (PrimitiveValue::U32(words), 32) => words.iter().take(count).copied().collect(),
        (PrimitiveValue::I32(words), 32) => words.iter().take(count).map(|&w| w as u32).collect(),
        (other, bits) => {
            return Err(DecodeError::Unsupported(format!(
                "{:?} pixel data with {bits} bits allocated",
                other.value_type()
            )))
        }
    };

    if words.len() < count {
        return Err(DecodeError::Malformed(format!(
            "pixel data holds {} samples, expected {count}",
            words.len()
        )));
    }

    Ok(words.into_iter().map(|w| layout.interpret(w)).collect())
}
