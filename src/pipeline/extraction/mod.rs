pub mod types;
pub mod dimension;
pub mod confidence;
pub mod preprocess;
pub mod vision;
pub mod ocr;
pub mod reconcile;
pub mod orchestrator;
pub mod pdf_renderer;

pub use types::*;
pub use dimension::*;
pub use confidence::*;
pub use reconcile::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

/// Extraction pipeline error taxonomy.
///
/// Only `ImageDecode` is a hard failure of the pipeline. `VisionUnavailable`
/// and `OcrUnavailable` are soft: the orchestrator degrades to the surviving
/// source and caps confidence instead of propagating them.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("Vision extractor unavailable: {0}")]
    VisionUnavailable(String),

    #[error("OCR reader unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Extraction cancelled")]
    Cancelled,
}
