//! PDF text layer access and page rendering via Google PDFium.
//!
//! `PdfiumBackend` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`, and the
//! loaded document is dropped before the operation returns.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::io::Cursor;
use std::sync::Mutex;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfBackend;
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// PDF backend built on PDFium.
///
/// Reads the embedded text layer with PDFium's text API and renders pages
/// to PNG for OCR. Handles CIDFonts, embedded fonts and complex layouts.
pub struct PdfiumBackend;

impl PdfiumBackend {
    /// Create a new backend, verifying the PDFium library is loadable.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfLibrary(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [
                exe_dir.to_path_buf(),
                exe_dir.join("pdfium").join("lib"),
                exe_dir.join("..").join("lib"),
            ];

            for dir in &candidates {
                let lib_path = Pdfium::pdfium_platform_library_name_at_path(
                    dir.to_string_lossy().as_ref(),
                );
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfLibrary(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, detecting encrypted PDFs.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfParsing(format!("Failed to load PDF: {msg}"))
    }
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX].
/// Preserves aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfBackend for PdfiumBackend {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn page_texts(
        &self,
        pdf_bytes: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<String>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let total = pages.len() as usize;
        let wanted = limit.map_or(total, |l| l.min(total));

        let mut texts = Vec::with_capacity(wanted);
        for (idx, page) in pages.iter().take(wanted).enumerate() {
            let text = page.text().map_err(|e| {
                ExtractionError::PdfParsing(format!("Failed to read text of page {}: {e}", idx + 1))
            })?;
            texts.push(text.all());
        }

        debug!(total_pages = total, read_pages = texts.len(), "Read PDF text layer");
        Ok(texts)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();

        let page_index = u16::try_from(page_number).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("Page index {page_number} exceeds u16 maximum"),
        })?;

        let page = pages
            .get(page_index)
            .map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (document has {} pages)",
                    pages.len()
                ),
            })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        let uncapped_h = (height_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let dynamic_image = bitmap.as_image();
        let mut cursor = Cursor::new(Vec::new());
        dynamic_image
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        let png_bytes = cursor.into_inner();

        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );

        Ok(png_bytes)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// In-memory PDF backend: one text string per page.
///
/// Records which text limits were requested and which pages were rendered
/// so tests can assert which acquisition path ran.
pub struct MockPdfBackend {
    pages: Vec<String>,
    text_error: Option<String>,
    full_read_error: Option<String>,
    render_error: Option<String>,
    text_requests: Mutex<Vec<Option<usize>>>,
    rendered_pages: Mutex<Vec<usize>>,
}

impl MockPdfBackend {
    pub fn with_pages(pages: Vec<&str>) -> Self {
        Self {
            pages: pages.into_iter().map(String::from).collect(),
            text_error: None,
            full_read_error: None,
            render_error: None,
            text_requests: Mutex::new(Vec::new()),
            rendered_pages: Mutex::new(Vec::new()),
        }
    }

    /// A scanned document: `count` pages with no text layer.
    pub fn scanned(count: usize) -> Self {
        Self::with_pages(vec![""; count])
    }

    /// Every text layer read fails with `reason`.
    pub fn failing_text(mut self, reason: &str) -> Self {
        self.text_error = Some(reason.to_string());
        self
    }

    /// Bounded reads succeed but reading the whole document fails with `reason`.
    pub fn failing_full_read(mut self, reason: &str) -> Self {
        self.full_read_error = Some(reason.to_string());
        self
    }

    /// Every page render fails with `reason`.
    pub fn failing_render(mut self, reason: &str) -> Self {
        self.render_error = Some(reason.to_string());
        self
    }

    pub fn text_requests(&self) -> Vec<Option<usize>> {
        self.text_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn rendered_pages(&self) -> Vec<usize> {
        self.rendered_pages
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl PdfBackend for MockPdfBackend {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }

    fn page_texts(
        &self,
        _pdf_bytes: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<String>, ExtractionError> {
        if let Ok(mut requests) = self.text_requests.lock() {
            requests.push(limit);
        }
        if let Some(reason) = &self.text_error {
            return Err(ExtractionError::PdfParsing(reason.clone()));
        }
        if let (None, Some(reason)) = (limit, &self.full_read_error) {
            return Err(ExtractionError::PdfParsing(reason.clone()));
        }
        let wanted = limit.map_or(self.pages.len(), |l| l.min(self.pages.len()));
        Ok(self.pages[..wanted].to_vec())
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if let Some(reason) = &self.render_error {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: reason.clone(),
            });
        }
        if page_number >= self.pages.len() {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (mock has {} pages)",
                    self.pages.len()
                ),
            });
        }
        if let Ok(mut rendered) = self.rendered_pages.lock() {
            rendered.push(page_number);
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 PNG for mock rendering.
fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
