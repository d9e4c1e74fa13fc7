//! Text OCR adapter — deterministic, context-blind fallback source.
//!
//! Returns raw text blocks only; it knows nothing about rooms. All engine
//! configuration (tessdata directory, languages) is passed explicitly into
//! the constructor, never set as process-global state.

use super::types::{OcrReader, RawTextBlock};
use super::ExtractionError;

/// Bundled Tesseract OCR reader.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractOcr {
    tessdata_dir: std::path::PathBuf,
    lang: String,
}

#[cfg(feature = "ocr")]
impl TesseractOcr {
    /// Initialize with a tessdata directory; English traineddata must exist.
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            lang: "eng".to_string(),
        })
    }

    /// Initialize from the application's own tessdata directory
    /// (`~/Floorlens/tessdata`), where the installer places traineddata.
    pub fn bundled() -> Result<Self, ExtractionError> {
        Self::new(&crate::config::tessdata_dir())
    }

    /// Set language(s) for recognition (e.g. "eng", "eng+fra").
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrReader for TesseractOcr {
    fn read_text(&self, image_bytes: &[u8]) -> Result<Vec<RawTextBlock>, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrUnavailable("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(&self.lang))
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Init failed: {e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Image load failed: {e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Recognition failed: {e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        // One block per non-empty line; dimension labels on plans read as
        // short isolated lines, which suits the downstream token scan.
        let blocks = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| RawTextBlock {
                text: line.to_string(),
                confidence,
            })
            .collect();

        Ok(blocks)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Mock OCR reader for unit testing without Tesseract.
pub struct MockOcrReader {
    blocks: Vec<RawTextBlock>,
    failure: Option<String>,
}

impl MockOcrReader {
    pub fn with_lines(lines: &[&str], confidence: f32) -> Self {
        Self {
            blocks: lines
                .iter()
                .map(|line| RawTextBlock {
                    text: line.to_string(),
                    confidence,
                })
                .collect(),
            failure: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            blocks: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }
}

impl OcrReader for MockOcrReader {
    fn read_text(&self, _image_bytes: &[u8]) -> Result<Vec<RawTextBlock>, ExtractionError> {
        match &self.failure {
            Some(reason) => Err(ExtractionError::OcrUnavailable(reason.clone())),
            None => Ok(self.blocks.clone()),
        }
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_configured_lines() {
        let reader = MockOcrReader::with_lines(&["Kitchen 10' x 12'", "14' x 12'"], 0.9);
        let blocks = reader.read_text(b"fake-plan").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "Kitchen 10' x 12'");
        assert!((blocks[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn mock_failure_maps_to_ocr_unavailable() {
        let reader = MockOcrReader::failing("binary not installed");
        let err = reader.read_text(b"fake").unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable(_)));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn tesseract_rejects_missing_tessdata() {
        let dir = tempfile::tempdir().unwrap();
        let result = TesseractOcr::new(dir.path());
        assert!(matches!(result, Err(ExtractionError::TessdataNotFound(_))));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn bundled_reader_points_at_app_tessdata() {
        let expected = crate::config::tessdata_dir();
        match TesseractOcr::bundled() {
            Ok(reader) => assert_eq!(reader.tessdata_dir, expected),
            Err(ExtractionError::TessdataNotFound(dir)) => assert_eq!(dir, expected),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn tesseract_initializes_with_system_tessdata() {
        let tessdata_dir = std::path::Path::new("/usr/share/tesseract-ocr/5/tessdata");
        if !tessdata_dir.exists() {
            return; // Skip on systems without Tesseract
        }
        let reader = TesseractOcr::new(tessdata_dir).unwrap().with_languages("eng");
        assert_eq!(reader.lang, "eng");
    }
}
