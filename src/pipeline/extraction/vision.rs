//! Vision extraction adapter — locates rooms and dimension text via a
//! Gemini-style multimodal API.
//!
//! The adapter returns raw signals only; matching, merging, and scoring all
//! happen downstream. It is treated as an untrusted, possibly-absent source:
//! every transport or parse failure maps to `VisionUnavailable`, which the
//! orchestrator downgrades to the OCR fallback path instead of propagating.
//!
//! The model is not guaranteed deterministic across calls — identical image
//! bytes may yield differing room lists.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{ExtractionConfig, RawVisionRoom, VisionExtractor};
use super::ExtractionError;

/// Fixed extraction prompt. The model must answer with strict JSON so the
/// response can be parsed without a repair pass.
const EXTRACTION_PROMPT: &str = "\
You are a floor-plan analyst. Identify every room in this floor-plan image. \
For each room report its label (e.g. \"Master Bedroom\"), the dimension text \
printed on the plan if any (e.g. \"14' x 12'\"), and notable features \
(e.g. \"Walk-in Closet\", \"Natural Light\"). \
Respond with JSON only, no prose, in exactly this shape: \
{\"rooms\": [{\"type\": \"...\", \"dimensions\": \"...\", \"features\": [\"...\"]}]} \
Use null for dimensions when the plan shows none.";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Production vision extractor backed by the Gemini `generateContent` API.
pub struct GeminiVision {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl GeminiVision {
    /// The request timeout comes from [`ExtractionConfig::adapter_timeout_secs`],
    /// so one config tunes the whole pipeline.
    pub fn new(api_key: &str, config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let timeout_secs = config.adapter_timeout_secs;
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::VisionUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs,
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

// ── Wire types ──

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Part<'a> {
    Text(&'a str),
    InlineData { mime_type: &'a str, data: String },
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

/// The JSON shape the prompt demands from the model.
#[derive(Deserialize)]
struct RoomsPayload {
    rooms: Vec<RawVisionRoom>,
}

impl VisionExtractor for GeminiVision {
    fn extract_rooms(&self, image_bytes: &[u8]) -> Result<Vec<RawVisionRoom>, ExtractionError> {
        let _span = tracing::info_span!(
            "vision_extract",
            model = %self.model,
            image_size = image_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text(EXTRACTION_PROMPT),
                    Part::InlineData {
                        mime_type: sniff_mime_type(image_bytes),
                        data: encoded,
                    },
                ],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ExtractionError::VisionUnavailable(format!("Cannot reach {}", self.base_url))
            } else if e.is_timeout() {
                ExtractionError::VisionUnavailable(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                ExtractionError::VisionUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // Quota exhaustion (429) lands here too — non-fatal upstream.
            let body = response.text().unwrap_or_default();
            return Err(ExtractionError::VisionUnavailable(format!(
                "API returned {status}: {body}"
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| ExtractionError::VisionUnavailable(format!("Bad response body: {e}")))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                ExtractionError::VisionUnavailable("Response held no candidates".into())
            })?;

        let rooms = parse_rooms_payload(text)?;

        info!(
            model = %self.model,
            elapsed_ms = %start.elapsed().as_millis(),
            rooms = rooms.len(),
            "Vision extraction complete"
        );

        Ok(rooms)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Parse the model's JSON answer, tolerating markdown code fences that
/// multimodal models wrap around JSON despite instructions not to.
fn parse_rooms_payload(text: &str) -> Result<Vec<RawVisionRoom>, ExtractionError> {
    let stripped = strip_code_fences(text);
    let payload: RoomsPayload = serde_json::from_str(stripped)
        .map_err(|e| ExtractionError::VisionUnavailable(format!("Unparseable rooms JSON: {e}")))?;
    Ok(payload.rooms)
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag ("json") after the opening fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// PNG and JPEG are distinguishable by magic bytes; PNG is the safe default
/// for anything else (rendered PDF pages arrive as PNG).
fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else {
        "image/png"
    }
}

// ── MockVisionExtractor (testing) ──

/// Mock vision extractor returning configured rooms or a forced failure.
pub struct MockVisionExtractor {
    rooms: Vec<RawVisionRoom>,
    failure: Option<String>,
}

impl MockVisionExtractor {
    pub fn with_rooms(rooms: Vec<RawVisionRoom>) -> Self {
        Self {
            rooms,
            failure: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            rooms: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }
}

impl VisionExtractor for MockVisionExtractor {
    fn extract_rooms(&self, _image_bytes: &[u8]) -> Result<Vec<RawVisionRoom>, ExtractionError> {
        match &self.failure {
            Some(reason) => Err(ExtractionError::VisionUnavailable(reason.clone())),
            None => Ok(self.rooms.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-vision"
    }
}
