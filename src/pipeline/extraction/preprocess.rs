//! Input validation and OCR preprocessing for plan images.
//!
//! An unreadable input image is the one hard failure of the pipeline, so it
//! is caught here before any adapter spends a network call on it.

use std::io::Cursor;

use image::ImageFormat;
use tracing::debug;

use super::ExtractionError;

/// Maximum input image size before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Smallest valid PNG is ~67 bytes.
const MIN_IMAGE_BYTES: usize = 67;

/// Verify the input decodes as an image. Errors here abort the request;
/// everything later in the pipeline degrades instead of failing.
pub fn validate_image(image_bytes: &[u8]) -> Result<(), ExtractionError> {
    if image_bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecode(format!(
            "Input too small to be an image ({} bytes)",
            image_bytes.len()
        )));
    }
    if image_bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecode(format!(
            "Input exceeds {} MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    image::load_from_memory(image_bytes)
        .map(|_| ())
        .map_err(|e| ExtractionError::ImageDecode(e.to_string()))
}

/// Grayscale the plan image and re-encode as PNG for the OCR engine.
/// Line drawings carry no useful color; grayscale sharpens dimension text.
pub fn preprocess_for_ocr(image_bytes: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| ExtractionError::ImageDecode(e.to_string()))?;

    let gray = img.grayscale();
    let mut buf = Cursor::new(Vec::new());
    gray.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageDecode(format!("PNG re-encode failed: {e}")))?;

    debug!(
        input_bytes = image_bytes.len(),
        output_bytes = buf.get_ref().len(),
        "Preprocessed plan image for OCR"
    );

    Ok(buf.into_inner())
}
