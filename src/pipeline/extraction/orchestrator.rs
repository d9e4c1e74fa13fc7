//! End-to-end extraction orchestration.
//!
//! Drives the sequence: attempt vision → conditionally fall back to or
//! validate with OCR → reconcile → score → assemble the final result. The
//! fallback/validation branching is an explicit state machine rather than
//! nested error-handling, so each transition is independently testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::confidence::{agreement_label, score, AgreementInputs};
use super::dimension::DimensionParser;
use super::preprocess::{preprocess_for_ocr, validate_image};
use super::reconcile::reconcile;
use super::types::{
    round2, DimensionSource, ExtractionConfig, ExtractionMethod, ExtractionResult, OcrReader,
    RawTextBlock, RawVisionRoom, VisionExtractor,
};
use super::ExtractionError;

/// Pipeline states for one analysis request. Local to the request and
/// discarded on completion; nothing is shared across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    VisionAttempted,
    OcrFallback,
    OcrValidate,
    Merge,
    Done,
}

/// Decide the post-vision transition.
///
/// Vision adapter errors, timeouts, and zero dimensioned rooms all lead to
/// the fallback path; one usable dimension is enough for OCR to drop into a
/// corroborating role.
pub fn next_after_vision(vision_ok: bool, dimensioned_rooms: usize) -> PipelineState {
    if vision_ok && dimensioned_rooms >= 1 {
        PipelineState::OcrValidate
    } else {
        PipelineState::OcrFallback
    }
}

/// The single entry point consumed by the rest of the system.
///
/// Holds trait objects for both adapters, enabling dependency injection;
/// per-request tunables arrive via [`ExtractionConfig`].
pub struct PlanExtractor {
    vision: Box<dyn VisionExtractor + Send + Sync>,
    ocr: Box<dyn OcrReader + Send + Sync>,
    config: ExtractionConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl PlanExtractor {
    pub fn new(
        vision: Box<dyn VisionExtractor + Send + Sync>,
        ocr: Box<dyn OcrReader + Send + Sync>,
    ) -> Self {
        Self {
            vision,
            ocr,
            config: ExtractionConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a cancellation flag; when set, the pipeline stops before its
    /// next adapter call instead of leaving orphaned work.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check_cancelled(&self) -> Result<(), ExtractionError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ExtractionError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Run the full pipeline over one plan image.
    ///
    /// The only hard failure is an input that cannot be decoded as an image;
    /// adapter outages degrade to single-source extraction with capped
    /// confidence. Re-running with identical bytes is idempotent for the
    /// OCR, parsing, and reconciliation stages, but not end-to-end: the
    /// vision model may return different candidates across calls.
    pub fn extract(&self, image_bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!("plan_extract", request_id = %request_id).entered();

        validate_image(image_bytes)?;

        let parser = DimensionParser::from_config(&self.config);
        let mut state = PipelineState::Init;
        debug!(state = ?state, "Pipeline start");

        // ── VISION_ATTEMPTED ──
        self.check_cancelled()?;
        let (vision_rooms, vision_available, vision_note) =
            match self.vision.extract_rooms(image_bytes) {
                Ok(rooms) => (rooms, true, None),
                Err(e) => {
                    warn!(error = %e, "Vision extractor failed, degrading");
                    (Vec::new(), false, Some(format!("vision: unavailable ({e})")))
                }
            };
        let dimensioned = count_dimensioned(&vision_rooms, &parser);
        state = PipelineState::VisionAttempted;
        debug!(state = ?state, rooms = vision_rooms.len(), dimensioned, "Vision attempted");

        // ── OCR_FALLBACK | OCR_VALIDATE ──
        state = next_after_vision(vision_available, dimensioned);
        debug!(state = ?state, "Post-vision transition");

        let skip_ocr = state == PipelineState::OcrFallback && !self.config.ocr_fallback_enabled;
        let (ocr_blocks, ocr_available, ocr_note) = if skip_ocr {
            (Vec::new(), false, Some("OCR fallback disabled".to_string()))
        } else {
            self.check_cancelled()?;
            match self.run_ocr(image_bytes) {
                Ok(blocks) => (blocks, true, None),
                Err(e) => {
                    warn!(error = %e, "OCR reader failed, degrading");
                    (Vec::new(), false, Some(format!("OCR: unavailable ({e})")))
                }
            }
        };

        // ── MERGE ──
        state = PipelineState::Merge;
        debug!(state = ?state, "Merging sources");
        let reconciliation = reconcile(
            &vision_rooms,
            &ocr_blocks,
            &parser,
            self.config.area_tolerance_pct,
        );

        let inputs = AgreementInputs {
            vision_dimensioned: reconciliation.vision_dimensioned,
            ocr_tokens: reconciliation.ocr_token_count,
            conflicts: reconciliation.conflicts.len(),
            vision_available,
        };
        let confidence = score(&inputs);

        // ── DONE ──
        state = PipelineState::Done;
        debug!(state = ?state, "Pipeline complete");

        let extraction_method = resolve_method(&inputs, &vision_rooms);
        let total_sqft = round2(
            reconciliation
                .rooms
                .iter()
                .filter_map(|room| room.area_sqft)
                .sum(),
        );

        let notes = assemble_notes(
            vision_note,
            ocr_note,
            ocr_available.then(|| {
                format!(
                    "OCR: {} ({} found)",
                    self.ocr.name(),
                    reconciliation.ocr_token_count
                )
            }),
            agreement_label(&inputs),
            &reconciliation.notes,
            confidence,
        );

        info!(
            method = extraction_method.as_str(),
            rooms = reconciliation.rooms.len(),
            total_sqft,
            confidence,
            "Extraction finished"
        );

        Ok(ExtractionResult {
            request_id,
            extracted_at: Utc::now(),
            extraction_method,
            confidence,
            rooms: reconciliation.rooms,
            total_sqft,
            notes,
        })
    }

    fn run_ocr(&self, image_bytes: &[u8]) -> Result<Vec<RawTextBlock>, ExtractionError> {
        let processed = preprocess_for_ocr(image_bytes)?;
        self.ocr.read_text(&processed)
    }
}

fn count_dimensioned(rooms: &[RawVisionRoom], parser: &DimensionParser) -> usize {
    rooms
        .iter()
        .filter(|room| {
            room.dimensions
                .as_deref()
                .and_then(|raw| parser.parse(raw, DimensionSource::Vision))
                .is_some()
        })
        .count()
}

/// The method must reflect which source(s) actually contributed dimension
/// data. When neither did, it names the source that at least supplied the
/// room list.
fn resolve_method(inputs: &AgreementInputs, vision_rooms: &[RawVisionRoom]) -> ExtractionMethod {
    match (inputs.vision_dimensioned > 0, inputs.ocr_tokens > 0) {
        (true, true) => ExtractionMethod::VisionOcrValidated,
        (true, false) => ExtractionMethod::GeminiVision,
        (false, true) => ExtractionMethod::OcrFallback,
        (false, false) => {
            if inputs.vision_available && !vision_rooms.is_empty() {
                ExtractionMethod::GeminiVision
            } else {
                ExtractionMethod::OcrFallback
            }
        }
    }
}

fn assemble_notes(
    vision_note: Option<String>,
    ocr_note: Option<String>,
    ocr_summary: Option<String>,
    agreement: &str,
    reconciliation_notes: &[String],
    confidence: f32,
) -> String {
    let mut segments = Vec::new();
    if let Some(note) = vision_note {
        segments.push(note);
    }
    if let Some(summary) = ocr_summary {
        segments.push(summary);
    }
    if let Some(note) = ocr_note {
        segments.push(note);
    }
    segments.push(format!("agreement: {agreement}"));
    segments.extend(reconciliation_notes.iter().cloned());
    if confidence == 0.0 {
        segments.push("no dimensions found; manual review needed".to_string());
    }
    segments.join("; ")
}

#[cfg(test)]
mod tests {
    use super::super::ocr::MockOcrReader;
    use super::super::vision::MockVisionExtractor;
    use super::*;

    fn sample_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([250u8, 250, 250]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn vision_room(room_type: &str, dimensions: Option<&str>) -> RawVisionRoom {
        RawVisionRoom {
            room_type: room_type.to_string(),
            dimensions: dimensions.map(str::to_string),
            features: vec![],
        }
    }

    fn three_room_plan() -> Vec<RawVisionRoom> {
        vec![
            vision_room("Master Bedroom", Some("14' x 12'")),
            vision_room("Living Room", Some("16' x 18'")),
            vision_room("Kitchen", Some("10' x 12'")),
        ]
    }

    // ── transition function ──

    #[test]
    fn vision_with_dimensions_routes_to_validate() {
        assert_eq!(next_after_vision(true, 3), PipelineState::OcrValidate);
        assert_eq!(next_after_vision(true, 1), PipelineState::OcrValidate);
    }

    #[test]
    fn vision_failure_or_empty_routes_to_fallback() {
        assert_eq!(next_after_vision(false, 0), PipelineState::OcrFallback);
        assert_eq!(next_after_vision(true, 0), PipelineState::OcrFallback);
    }

    // ── end-to-end ──

    #[test]
    fn both_sources_agree_end_to_end() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(three_room_plan())),
            Box::new(MockOcrReader::with_lines(
                &[
                    "Master Bedroom 14' x 12'",
                    "Living Room 16' x 18'",
                    "Kitchen 10' x 12'",
                ],
                0.9,
            )),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert_eq!(result.rooms.len(), 3);
        // 168 + 288 + 120
        assert_eq!(result.total_sqft, 576.0);
        assert!(result.confidence >= 0.85, "confidence {}", result.confidence);
        assert_eq!(result.extraction_method, ExtractionMethod::VisionOcrValidated);
        assert!(result.notes.contains("agreement: good"));
        assert!(result.notes.contains("OCR: tesseract (3 found)"));
    }

    #[test]
    fn vision_error_falls_back_to_ocr() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::failing("quota exceeded")),
            Box::new(MockOcrReader::with_lines(
                &[
                    "14' x 12'",
                    "16' x 18'",
                    "10' x 12'",
                    "11' x 10'",
                    "9' x 8'",
                ],
                0.85,
            )),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert_eq!(result.extraction_method, ExtractionMethod::OcrFallback);
        assert!(result.confidence <= 0.70, "confidence {}", result.confidence);
        assert_eq!(result.rooms.len(), 5);
        assert!(result.notes.contains("vision: unavailable"));
    }

    #[test]
    fn ocr_error_leaves_vision_only() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(three_room_plan())),
            Box::new(MockOcrReader::failing("binary not installed")),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert_eq!(result.extraction_method, ExtractionMethod::GeminiVision);
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.total_sqft, 576.0);
        assert!(result.notes.contains("OCR: unavailable"));
    }

    #[test]
    fn no_dimensions_anywhere_flags_manual_review() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(vec![vision_room(
                "Kitchen", None,
            )])),
            Box::new(MockOcrReader::with_lines(&["SHEET 2 OF 5"], 0.6)),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        // Room type is still preserved even without dimensions
        assert_eq!(result.rooms.len(), 1);
        assert!(!result.rooms[0].has_dimensions());
        assert_eq!(result.total_sqft, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.notes.contains("manual review"));
        assert_eq!(result.extraction_method, ExtractionMethod::GeminiVision);
    }

    #[test]
    fn both_sources_dead_flags_manual_review() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::failing("down")),
            Box::new(MockOcrReader::failing("missing")),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert!(result.rooms.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.extraction_method, ExtractionMethod::OcrFallback);
        assert!(result.notes.contains("manual review"));
    }

    #[test]
    fn disabled_fallback_skips_ocr() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::failing("down")),
            Box::new(MockOcrReader::with_lines(&["Kitchen 10' x 12'"], 0.9)),
        )
        .with_config(ExtractionConfig {
            ocr_fallback_enabled: false,
            ..ExtractionConfig::default()
        });

        let result = extractor.extract(&sample_png()).unwrap();
        assert!(result.rooms.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert!(result.notes.contains("OCR fallback disabled"));
    }

    #[test]
    fn ocr_validates_when_vision_has_dimensions() {
        // OCR still runs in the validate path even though vision is
        // authoritative; its corroboration lifts confidence to the high band.
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(vec![vision_room(
                "Kitchen",
                Some("10' x 12'"),
            )])),
            Box::new(MockOcrReader::with_lines(&["Kitchen 10' x 12'"], 0.9)),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert_eq!(result.extraction_method, ExtractionMethod::VisionOcrValidated);
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn conflicting_sources_lower_confidence_and_note() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(vec![vision_room(
                "Living Room",
                Some("16' x 18'"),
            )])),
            Box::new(MockOcrReader::with_lines(&["Living Room 13' x 18'"], 0.9)),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        assert!(result.confidence < 0.85);
        assert!(result.notes.contains("kept vision"));
        // Vision value survives the conflict
        assert_eq!(result.rooms[0].width_ft, Some(16.0));
    }

    #[test]
    fn corrupt_image_is_the_only_hard_failure() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(three_room_plan())),
            Box::new(MockOcrReader::with_lines(&[], 0.0)),
        );
        let err = extractor.extract(&[0u8; 512]).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageDecode(_)));
    }

    #[test]
    fn pre_set_cancel_flag_stops_pipeline() {
        let flag = Arc::new(AtomicBool::new(true));
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(three_room_plan())),
            Box::new(MockOcrReader::with_lines(&[], 0.0)),
        )
        .with_cancel_flag(flag);

        let err = extractor.extract(&sample_png()).unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled));
    }

    #[test]
    fn result_serializes_wire_shape() {
        let extractor = PlanExtractor::new(
            Box::new(MockVisionExtractor::with_rooms(vec![RawVisionRoom {
                room_type: "Living Room".into(),
                dimensions: Some("16' x 18'".into()),
                features: vec!["Natural Light".into()],
            }])),
            Box::new(MockOcrReader::with_lines(&["Living Room 16' x 18'"], 0.9)),
        );

        let result = extractor.extract(&sample_png()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["extraction_method"], "gemini_vision+ocr_validated");
        assert_eq!(json["rooms"][0]["type"], "Living Room");
        assert_eq!(json["rooms"][0]["width_ft"], 16.0);
        assert_eq!(json["rooms"][0]["area_sqft"], 288.0);
        assert_eq!(json["rooms"][0]["features"][0], "Natural Light");
        assert_eq!(json["total_sqft"], 288.0);
    }
}
