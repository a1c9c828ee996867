use std::fmt;

use super::ExtractionError;

/// Text acquired from a single document.
///
/// `text` is never blank: an acquisition that yields only whitespace is
/// reported as [`ExtractionError::NoTextExtracted`] instead.
#[derive(Debug, Clone)]
pub struct AcquiredText {
    pub method: ExtractionMethod,
    pub text: String,
    /// Total pages in the document.
    pub page_count: usize,
    /// Pages whose content contributed to `text`.
    pub pages_processed: usize,
}

/// How text was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    TextLayer,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextLayer => "text_layer",
            Self::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw OCR result from the engine
#[derive(Debug)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    /// Recognize text in an encoded raster image (PNG).
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// PDF library abstraction: text layer access and page rendering.
///
/// Every call opens the document from `pdf_bytes`, does its work and
/// releases the library handle before returning.
pub trait PdfBackend {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Embedded text of each page, in document order.
    /// `limit` bounds how many leading pages are read; `None` reads all.
    fn page_texts(
        &self,
        pdf_bytes: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<String>, ExtractionError>;

    /// Render one page (0-based) to PNG bytes at the given resolution.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}
