//! Floorlens — floor-plan room and dimension extraction.
//!
//! Ingests a floor-plan image (PNG/JPEG, or a single rendered PDF page) and
//! produces structured per-room measurements (type, width, length, area) plus
//! a confidence score for downstream pricing and comparison analytics.
//!
//! The pipeline pairs two independent sources:
//! - a **vision extractor** (multimodal model, context-aware, non-deterministic)
//! - an **OCR reader** (Tesseract, deterministic, context-blind)
//!
//! Their outputs are parsed, matched, merged, and scored before anything
//! downstream consumes them. See [`pipeline::extraction::PlanExtractor`] for
//! the single entry point.

pub mod config;
pub mod pipeline;

pub use pipeline::extraction::{
    DimensionParser, ExtractionConfig, ExtractionError, ExtractionMethod, ExtractionResult,
    PlanExtractor, Room,
};

use tracing_subscriber::EnvFilter;

/// Initialize tracing output for binaries and integration harnesses.
///
/// Respects `RUST_LOG`, falling back to the crate default filter.
/// Library consumers that install their own subscriber should skip this.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
