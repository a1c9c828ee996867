use std::path::Path;

use super::sanitize::sanitize_extracted_text;
use super::types::{AcquiredText, ExtractionMethod, OcrEngine, PdfBackend};
use super::ExtractionError;

/// Leading pages inspected when deciding whether a text layer exists.
pub const PROBE_PAGE_LIMIT: usize = 3;

/// Leading pages rendered and recognized on the OCR path.
pub const OCR_PAGE_LIMIT: usize = 3;

/// Resolution used when rendering pages for OCR.
pub const OCR_RENDER_DPI: u32 = 200;

/// Decides between the embedded text layer and OCR, then acquires the text.
/// Uses trait objects for the PDF library and OCR engine, enabling dependency injection.
pub struct TextAcquirer {
    pdf_backend: Box<dyn PdfBackend + Send + Sync>,
    ocr_engine: Box<dyn OcrEngine + Send + Sync>,
}

impl TextAcquirer {
    pub fn new(
        pdf_backend: Box<dyn PdfBackend + Send + Sync>,
        ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    ) -> Self {
        Self {
            pdf_backend,
            ocr_engine,
        }
    }

    /// Read the document at `path` and acquire its text.
    pub fn acquire_text(&self, path: &Path) -> Result<AcquiredText, ExtractionError> {
        let _span = tracing::info_span!("acquire_text", path = %path.display()).entered();

        let pdf_bytes = std::fs::read(path)?;
        self.acquire_from_bytes(&pdf_bytes)
    }

    /// Acquire text from an in-memory PDF.
    ///
    /// The text layer and OCR paths are mutually exclusive: once the probe
    /// finds text, a failure while reading it is reported, never retried via OCR.
    pub fn acquire_from_bytes(&self, pdf_bytes: &[u8]) -> Result<AcquiredText, ExtractionError> {
        let start = std::time::Instant::now();

        let acquired = if self.has_text_layer(pdf_bytes) {
            self.extract_text_layer(pdf_bytes)?
        } else {
            self.ocr_leading_pages(pdf_bytes)?
        };

        tracing::info!(
            method = %acquired.method,
            page_count = acquired.page_count,
            pages_processed = acquired.pages_processed,
            text_length = acquired.text.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Text acquisition complete"
        );

        Ok(acquired)
    }

    /// True when any of the first [`PROBE_PAGE_LIMIT`] pages has non-blank text.
    /// A probe that fails at the library boundary counts as "no text layer".
    fn has_text_layer(&self, pdf_bytes: &[u8]) -> bool {
        match self.pdf_backend.page_texts(pdf_bytes, Some(PROBE_PAGE_LIMIT)) {
            Ok(texts) => {
                let found = texts.iter().any(|t| !t.trim().is_empty());
                tracing::debug!(probed_pages = texts.len(), found, "Text layer probe");
                found
            }
            Err(e) => {
                tracing::warn!(error = %e, "Text layer probe failed, falling back to OCR");
                false
            }
        }
    }

    fn extract_text_layer(&self, pdf_bytes: &[u8]) -> Result<AcquiredText, ExtractionError> {
        let texts = self.pdf_backend.page_texts(pdf_bytes, None)?;
        let text = sanitize_extracted_text(&texts.join("\n")).trim().to_string();

        if text.is_empty() {
            return Err(ExtractionError::NoTextExtracted {
                method: ExtractionMethod::TextLayer,
            });
        }

        Ok(AcquiredText {
            method: ExtractionMethod::TextLayer,
            text,
            page_count: texts.len(),
            pages_processed: texts.len(),
        })
    }

    /// Render and recognize at most [`OCR_PAGE_LIMIT`] leading pages.
    /// Each page's text is preceded by a `--- Page N ---` marker.
    fn ocr_leading_pages(&self, pdf_bytes: &[u8]) -> Result<AcquiredText, ExtractionError> {
        let page_count = self.pdf_backend.page_count(pdf_bytes)?;
        let to_render = page_count.min(OCR_PAGE_LIMIT);

        tracing::info!(page_count, to_render, "No text layer found, running OCR");

        let mut combined = String::new();
        let mut recognized_any = false;

        for page_idx in 0..to_render {
            let image = self
                .pdf_backend
                .render_page(pdf_bytes, page_idx, OCR_RENDER_DPI)?;
            let result = self.ocr_engine.ocr_image(&image)?;
            let page_text = sanitize_extracted_text(&result.text);

            tracing::debug!(
                page = page_idx + 1,
                confidence = result.confidence,
                text_len = page_text.len(),
                "OCR page complete"
            );

            recognized_any |= !page_text.trim().is_empty();
            combined.push_str(&format!("\n--- Page {} ---\n{}\n", page_idx + 1, page_text));
        }

        if !recognized_any {
            return Err(ExtractionError::NoTextExtracted {
                method: ExtractionMethod::Ocr,
            });
        }

        Ok(AcquiredText {
            method: ExtractionMethod::Ocr,
            text: combined.trim().to_string(),
            page_count,
            pages_processed: to_render,
        })
    }
}
