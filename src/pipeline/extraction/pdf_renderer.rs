//! PDF page rendering via Google PDFium.
//!
//! Floor plans often arrive as a page inside a listing PDF; callers render
//! that page to PNG here before handing the bytes to the pipeline.
//!
//! `PdfiumRenderer` is stateless. Each operation creates a fresh `Pdfium`
//! instance because the upstream type is `!Send`; the OS caches
//! `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

#[cfg(feature = "pdf")]
use std::io::Cursor;

#[cfg(feature = "pdf")]
use image::ImageFormat;
#[cfg(feature = "pdf")]
use pdfium_render::prelude::*;
#[cfg(feature = "pdf")]
use tracing::debug;

#[cfg(feature = "pdf")]
use super::types::PdfPageRenderer;
#[cfg(feature = "pdf")]
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
#[cfg(feature = "pdf")]
const MAX_DIMENSION_PX: i32 = 4096;

/// Default rendering DPI for plan pages; dimension text stays legible while
/// the upload stays small.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// PDF points per inch (standard PDF unit).
#[cfg(feature = "pdf")]
const POINTS_PER_INCH: f32 = 72.0;

/// Renders a single PDF page to PNG using Google PDFium.
#[cfg(feature = "pdf")]
pub struct PdfiumRenderer;

#[cfg(feature = "pdf")]
impl PdfiumRenderer {
    /// Create a new renderer, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable
/// 3. System library search paths
#[cfg(feature = "pdf")]
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings =
            Pdfium::bind_to_library(&path).map_err(|e| ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
            ),
        })?;
    Ok(Pdfium::new(bindings))
}

#[cfg(feature = "pdf")]
impl PdfPageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Failed to load PDF: {e}"),
            })?;

        let pages = document.pages();
        let page = pages
            .get(page_number as u16)
            .map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Page not found (PDF has {} pages)", pages.len()),
            })?;

        let scale = dpi as f32 / POINTS_PER_INCH;
        let target_width = ((page.width().value * scale) as i32).min(MAX_DIMENSION_PX);

        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().set_target_width(target_width))
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Render failed: {e}"),
            })?;

        let img = bitmap.as_image();
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("PNG encode failed: {e}"),
            })?;

        debug!(
            page = page_number,
            dpi,
            png_bytes = buf.get_ref().len(),
            "Rendered PDF page for extraction"
        );

        Ok(buf.into_inner())
    }
}
