//! Screenshot payload bounding
//!
//! A raw capture that already fits the ceiling is passed through untouched.
//! Otherwise it is re-encoded as JPEG along a fixed ladder of
//! (scale, quality) rungs, smallest-loss first, until a rung fits. Falling
//! off the last rung is a [`EngineError::SizeExceeded`]: the payload is
//! never truncated.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use sdk::errors::EngineError;
use tracing::debug;

/// Default ceiling for an encoded screenshot (1 MiB)
pub const MAX_SCREENSHOT_BYTES: usize = 1024 * 1024;

/// (scale, JPEG quality) rungs, tried in order. The last rung is the floor.
const LADDER: [(f32, u8); 7] = [
    (1.0, 85),
    (1.0, 70),
    (0.85, 60),
    (0.7, 50),
    (0.55, 40),
    (0.4, 35),
    (0.3, 30),
];

/// An encoded image ready to ship as a content block
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Bound a raw capture to at most `limit` bytes.
pub fn bound_screenshot(raw: &[u8], limit: usize) -> Result<EncodedImage, EngineError> {
    let format = image::guess_format(raw)
        .map_err(|e| EngineError::ToolExecution(format!("Unrecognized screenshot data: {}", e)))?;

    if raw.len() <= limit {
        return Ok(EncodedImage {
            mime_type: format.to_mime_type().to_string(),
            bytes: raw.to_vec(),
        });
    }

    let image = image::load_from_memory_with_format(raw, format)
        .map_err(|e| EngineError::ToolExecution(format!("Failed to decode screenshot: {}", e)))?;

    let mut smallest = raw.len();
    for (scale, quality) in LADDER {
        let candidate = scaled(&image, scale);
        let bytes = encode_jpeg(&candidate, quality)?;
        debug!(
            scale,
            quality,
            size = bytes.len(),
            limit,
            "Re-encoded screenshot"
        );

        if bytes.len() <= limit {
            return Ok(EncodedImage {
                mime_type: "image/jpeg".to_string(),
                bytes,
            });
        }
        smallest = smallest.min(bytes.len());
    }

    Err(EngineError::SizeExceeded {
        size: smallest,
        limit,
    })
}

fn scaled(image: &DynamicImage, scale: f32) -> DynamicImage {
    if scale >= 1.0 {
        return image.clone();
    }
    let width = ((image.width() as f32) * scale).round().max(1.0) as u32;
    let height = ((image.height() as f32) * scale).round().max(1.0) as u32;
    image.resize_exact(width, height, FilterType::Triangle)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EngineError> {
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| EngineError::ToolExecution(format!("Failed to encode screenshot: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    /// PNG of deterministic noise, which compresses badly
    fn noise_png(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        let img = ImageBuffer::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([30u8, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_small_png_passes_through() {
        let raw = solid_png(64, 64);
        let bounded = bound_screenshot(&raw, MAX_SCREENSHOT_BYTES).unwrap();
        assert_eq!(bounded.mime_type, "image/png");
        assert_eq!(bounded.bytes, raw);
    }

    #[test]
    fn test_large_capture_is_reencoded_under_limit() {
        let raw = noise_png(320, 240);
        let limit = raw.len() / 4;

        let bounded = bound_screenshot(&raw, limit).unwrap();
        assert_eq!(bounded.mime_type, "image/jpeg");
        assert!(bounded.bytes.len() <= limit);
    }

    #[test]
    fn test_unreachable_limit_is_size_exceeded() {
        let raw = noise_png(64, 64);
        let err = bound_screenshot(&raw, 16).unwrap_err();
        match err {
            EngineError::SizeExceeded { size, limit } => {
                assert_eq!(limit, 16);
                assert!(size > 16);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        let err = bound_screenshot(b"definitely not an image", 4).unwrap_err();
        assert!(matches!(err, EngineError::ToolExecution(_)));
    }
}
