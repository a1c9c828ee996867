pub mod types;
pub mod sanitize;
pub mod pdfium;
pub mod ocr;
pub mod orchestrator;

pub use types::*;
pub use sanitize::*;
pub use pdfium::*;
pub use ocr::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDFium library unavailable: {0}")]
    PdfLibrary(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF is password-protected or encrypted")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR is unavailable: {0}")]
    OcrUnavailable(String),

    #[error("No text could be extracted ({method})")]
    NoTextExtracted { method: ExtractionMethod },
}
