//! Agreement scoring between the vision and OCR sources.
//!
//! Only the qualitative ordering of the bands is contractual: both sources
//! agreeing beats single-source, vision-only beats OCR-only, and nothing
//! found scores zero. The exact coefficients here are tuning.

/// Confidence bands used by the pipeline and downstream quality scoring.
pub mod thresholds {
    /// Floor of the medium band; disagreement never drags a two-source
    /// result below this.
    pub const MEDIUM_FLOOR: f32 = 0.50;

    /// OCR-only extraction is a fallback of last resort; never above this.
    pub const OCR_ONLY_CAP: f32 = 0.70;

    /// Vision-only result, uncorroborated.
    pub const VISION_ONLY: f32 = 0.75;

    /// Above this: both sources found the plan and agree.
    pub const HIGH: f32 = 0.85;
}

/// What each source contributed, fed to [`score`].
#[derive(Debug, Clone, Copy)]
pub struct AgreementInputs {
    /// Vision rooms that carried a parseable dimension.
    pub vision_dimensioned: usize,
    /// Dimension tokens parsed out of OCR text.
    pub ocr_tokens: usize,
    /// Reconciliation conflicts (areas differing beyond tolerance).
    pub conflicts: usize,
    /// Whether the vision adapter returned at all; breaks the tie when
    /// neither source yielded a dimension.
    pub vision_available: bool,
}

impl AgreementInputs {
    fn count_delta(&self) -> usize {
        self.vision_dimensioned.abs_diff(self.ocr_tokens)
    }

    fn both_contributed(&self) -> bool {
        self.vision_dimensioned > 0 && self.ocr_tokens > 0
    }
}

/// Derive the overall confidence for one extraction.
pub fn score(inputs: &AgreementInputs) -> f32 {
    // Neither source yielded a dimension: flag for manual review.
    if inputs.vision_dimensioned == 0 && inputs.ocr_tokens == 0 {
        return 0.0;
    }

    if inputs.both_contributed() {
        let delta = inputs.count_delta();
        if delta <= 1 && inputs.conflicts == 0 {
            // High band: counts agree within ±1, no conflicts.
            return 0.92 - 0.02 * delta as f32;
        }
        // Medium band, dropping with divergence severity.
        let penalty = 0.04 * delta.saturating_sub(1) as f32 + 0.08 * inputs.conflicts as f32;
        return (0.80 - penalty).clamp(thresholds::MEDIUM_FLOOR, thresholds::HIGH - 0.01);
    }

    if inputs.vision_dimensioned > 0 {
        return thresholds::VISION_ONLY;
    }

    // OCR only: scale with how much it found, capped well below vision.
    (0.40 + 0.05 * inputs.ocr_tokens as f32).min(thresholds::OCR_ONLY_CAP)
}

/// Human-readable agreement bucket for the result notes.
pub fn agreement_label(inputs: &AgreementInputs) -> &'static str {
    if inputs.vision_dimensioned == 0 && inputs.ocr_tokens == 0 {
        return "poor";
    }
    if inputs.both_contributed() && inputs.count_delta() <= 1 && inputs.conflicts == 0 {
        return "good";
    }
    "partial"
}
