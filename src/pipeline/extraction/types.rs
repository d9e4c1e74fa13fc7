use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExtractionError;

/// Round to two decimal places (room areas and dimensions are reported in
/// hundredths of a foot).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Which source produced a measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimensionSource {
    Vision,
    Ocr,
    Merged,
}

/// A parsed dimension pair, e.g. `14' x 12'` → 14.0 × 12.0 ft.
///
/// `raw_text` is preserved verbatim for audit. Both values are guaranteed by
/// the parser to sit inside the configured plausible room-size bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionToken {
    pub raw_text: String,
    pub value_a: f64,
    pub value_b: f64,
    pub unit: String,
    pub source: DimensionSource,
    /// Room label found in the same text block, when one was recognizable.
    /// Lets the reconciler match this token to a vision room by type.
    pub room_label: Option<String>,
}

impl DimensionToken {
    pub fn area(&self) -> f64 {
        round2(self.value_a * self.value_b)
    }
}

/// A single room with merged measurements.
///
/// `area_sqft` is always derived from width × length by the constructor,
/// never set independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    #[serde(rename = "type")]
    pub room_type: String,
    pub dimensions: Option<String>,
    pub width_ft: Option<f64>,
    pub length_ft: Option<f64>,
    pub area_sqft: Option<f64>,
    pub features: Vec<String>,
    pub source: DimensionSource,
}

impl Room {
    /// A room with known width and length; area is computed, not supplied.
    pub fn with_dimensions(
        room_type: impl Into<String>,
        dimensions: Option<String>,
        width_ft: f64,
        length_ft: f64,
        features: Vec<String>,
        source: DimensionSource,
    ) -> Self {
        Self {
            room_type: room_type.into(),
            dimensions,
            width_ft: Some(width_ft),
            length_ft: Some(length_ft),
            area_sqft: Some(round2(width_ft * length_ft)),
            features,
            source,
        }
    }

    /// A room whose dimensions neither source could supply. Emitted anyway so
    /// type and feature information is preserved; contributes no area.
    pub fn without_dimensions(
        room_type: impl Into<String>,
        features: Vec<String>,
        source: DimensionSource,
    ) -> Self {
        Self {
            room_type: room_type.into(),
            dimensions: None,
            width_ft: None,
            length_ft: None,
            area_sqft: None,
            features,
            source,
        }
    }

    pub fn has_dimensions(&self) -> bool {
        self.width_ft.is_some() && self.length_ft.is_some()
    }
}

/// How the final dimensions were obtained.
///
/// Reflects which source(s) actually contributed non-null dimension data,
/// not merely which were attempted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtractionMethod {
    #[serde(rename = "gemini_vision")]
    GeminiVision,
    #[serde(rename = "ocr_fallback")]
    OcrFallback,
    #[serde(rename = "gemini_vision+ocr_validated")]
    VisionOcrValidated,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::GeminiVision => "gemini_vision",
            ExtractionMethod::OcrFallback => "ocr_fallback",
            ExtractionMethod::VisionOcrValidated => "gemini_vision+ocr_validated",
        }
    }
}

/// Final output of one analysis request. Immutable once returned; later user
/// edits to room data happen in the surrounding CRUD system, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub request_id: Uuid,
    pub extracted_at: DateTime<Utc>,
    pub extraction_method: ExtractionMethod,
    pub confidence: f32,
    pub rooms: Vec<Room>,
    pub total_sqft: f64,
    pub notes: String,
}

/// The two sources disagreed on a room's area beyond tolerance.
/// Folded into `notes` and lowers confidence; never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationConflict {
    pub room_type: String,
    pub vision_area: f64,
    pub ocr_area: f64,
    pub delta_pct: f64,
}

/// Untrusted room candidate from the vision extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawVisionRoom {
    #[serde(rename = "type")]
    pub room_type: String,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Untrusted text block from OCR. No room context attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTextBlock {
    pub text: String,
    pub confidence: f32,
}

/// Per-request pipeline tunables. Passed explicitly into constructors —
/// never ambient process-global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Smallest plausible room dimension; smaller parsed values are rejected.
    pub min_dimension_ft: f64,
    /// Largest plausible room dimension; filters street addresses and page
    /// numbers picked up by OCR.
    pub max_dimension_ft: f64,
    /// Vision/OCR areas differing by more than this percentage are conflicts.
    pub area_tolerance_pct: f64,
    /// Request timeout for remote adapter calls; the vision client is built
    /// with it. In-process OCR is not time-bounded.
    pub adapter_timeout_secs: u64,
    /// Whether OCR may replace vision when vision yields nothing.
    pub ocr_fallback_enabled: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_dimension_ft: 2.0,
            max_dimension_ft: 40.0,
            area_tolerance_pct: 10.0,
            adapter_timeout_secs: 60,
            ocr_fallback_enabled: true,
        }
    }
}

/// Vision extractor abstraction (allows mocking for tests).
///
/// Returns raw candidate rooms only; no merging or scoring happens here.
pub trait VisionExtractor {
    fn extract_rooms(&self, image_bytes: &[u8]) -> Result<Vec<RawVisionRoom>, ExtractionError>;

    /// Engine name for the result notes, e.g. "gemini".
    fn name(&self) -> &str;
}

/// OCR reader abstraction (allows mocking for tests).
pub trait OcrReader {
    fn read_text(&self, image_bytes: &[u8]) -> Result<Vec<RawTextBlock>, ExtractionError>;

    /// Engine name for the result notes, e.g. "tesseract".
    fn name(&self) -> &str;
}

/// Single-page PDF rendering abstraction; callers render a plan page to PNG
/// before handing bytes to the pipeline.
pub trait PdfPageRenderer {
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}
