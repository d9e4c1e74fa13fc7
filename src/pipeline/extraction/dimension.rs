//! Dimension token parsing.
//!
//! Converts free-text dimension substrings (`14' x 12'`, `12'-6" x 10'-0"`,
//! `16x18`) into structured width/length values. Pure functions: a malformed
//! substring yields `None`, never an error — one bad token must not abort
//! extraction of the rest of the plan.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{round2, DimensionSource, DimensionToken, ExtractionConfig};

/// `<num>['|ft|"]? [-<inches>"]? x <num>['|ft|"]? [-<inches>"]?`
/// Case-insensitive, separator `x`/`X`/`×`. The inches group requires a
/// closing `"` so that plain ranges like `12-6` are not read as feet-inches.
static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(\d+(?:\.\d+)?)\s*(?:'|ft\.?|")?\s*(?:-\s*(\d+(?:\.\d+)?)\s*")?\s*[x×]\s*(\d+(?:\.\d+)?)\s*(?:'|ft\.?|")?\s*(?:-\s*(\d+(?:\.\d+)?)\s*")?"#,
    )
    .unwrap()
});

/// Room labels commonly printed next to dimensions on residential plans.
/// Longest alternatives first so "Master Bedroom" wins over "Bedroom".
static ROOM_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(master\s+bedroom|living\s+room|dining\s+room|family\s+room|great\s+room|walk-in\s+closet|bedroom|kitchen|bathroom|bath|garage|closet|office|den|laundry|foyer|hallway|hall|pantry|porch|utility|study|loft|basement)\b",
    )
    .unwrap()
});

/// Detect a room label inside a text block, normalized to title case.
pub fn detect_room_label(text: &str) -> Option<String> {
    ROOM_LABEL_RE
        .captures(text)
        .map(|caps| title_case(&caps[1]))
}

fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dimension parser with configurable plausible-size bounds.
///
/// Values outside the bounds reject the whole token — this filters false
/// positives such as street-address numbers and page numbers that OCR picks
/// up elsewhere on the sheet.
#[derive(Debug, Clone)]
pub struct DimensionParser {
    min_ft: f64,
    max_ft: f64,
}

impl Default for DimensionParser {
    fn default() -> Self {
        let config = ExtractionConfig::default();
        Self::new(config.min_dimension_ft, config.max_dimension_ft)
    }
}

impl DimensionParser {
    pub fn new(min_ft: f64, max_ft: f64) -> Self {
        Self { min_ft, max_ft }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.min_dimension_ft, config.max_dimension_ft)
    }

    /// Parse the first dimension pair in `raw`. Returns `None` when no
    /// pattern matches or the values fall outside the plausible bounds.
    pub fn parse(&self, raw: &str, source: DimensionSource) -> Option<DimensionToken> {
        let caps = DIMENSION_RE.captures(raw)?;
        self.token_from_captures(&caps, raw, source)
    }

    /// Scan a text block for every dimension pair it contains. OCR blocks
    /// covering several rooms can hold more than one.
    pub fn find_all(&self, text: &str, source: DimensionSource) -> Vec<DimensionToken> {
        let label = detect_room_label(text);
        DIMENSION_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let mut token = self.token_from_captures(&caps, text, source)?;
                token.raw_text = caps[0].trim().to_string();
                token.room_label = label.clone();
                Some(token)
            })
            .collect()
    }

    fn token_from_captures(
        &self,
        caps: &regex::Captures<'_>,
        raw: &str,
        source: DimensionSource,
    ) -> Option<DimensionToken> {
        let value_a = feet_value(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()))?;
        let value_b = feet_value(caps.get(3)?.as_str(), caps.get(4).map(|m| m.as_str()))?;

        if !self.in_bounds(value_a) || !self.in_bounds(value_b) {
            return None;
        }

        Some(DimensionToken {
            raw_text: raw.trim().to_string(),
            value_a,
            value_b,
            unit: "ft".to_string(),
            source,
            room_label: detect_room_label(raw),
        })
    }

    fn in_bounds(&self, value: f64) -> bool {
        value >= self.min_ft && value <= self.max_ft
    }
}

/// Combine a feet figure with optional inches notation: `12'-6"` → 12.5.
/// Malformed numerics are skipped (token dropped), never raised.
fn feet_value(feet: &str, inches: Option<&str>) -> Option<f64> {
    let feet: f64 = feet.parse().ok()?;
    let inches: f64 = match inches {
        Some(raw) => raw.parse().ok()?,
        None => 0.0,
    };
    if inches >= 12.0 {
        // Not a valid feet-inches reading; more likely an OCR artifact.
        return None;
    }
    Some(round2(feet + inches / 12.0))
}
