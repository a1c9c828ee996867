use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Language used for recognition unless overridden.
pub const DEFAULT_OCR_LANG: &str = "eng";

/// Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: Option<std::path::PathBuf>,
    lang: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with an optional tessdata directory.
    /// `None` lets Tesseract use `TESSDATA_PREFIX` or its compiled-in default.
    pub fn new(tessdata_dir: Option<&std::path::Path>) -> Result<Self, ExtractionError> {
        if let Some(dir) = tessdata_dir {
            if !dir.join(format!("{DEFAULT_OCR_LANG}.traineddata")).exists() {
                return Err(ExtractionError::OcrInit(format!(
                    "{DEFAULT_OCR_LANG}.traineddata not found in {}",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            tessdata_dir: tessdata_dir.map(|d| d.to_path_buf()),
            lang: DEFAULT_OCR_LANG.to_string(),
        })
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+fra")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata_str = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?,
            ),
            None => None,
        };

        let tess = tesseract::Tesseract::new(tessdata_str, Some(self.lang.as_str()))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        tracing::debug!(
            lang = %self.lang,
            text_len = text.len(),
            confidence,
            "Tesseract recognized page"
        );

        Ok(OcrPageResult { text, confidence })
    }
}

/// Stand-in engine used when Tesseract is not compiled in or failed to
/// initialize. Every call fails with [`ExtractionError::OcrUnavailable`].
pub struct UnavailableOcrEngine {
    reason: String,
}

impl UnavailableOcrEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrUnavailable(self.reason.clone()))
    }
}

/// Pick the OCR engine for this build.
///
/// With the `ocr` feature, Tesseract is initialized against `tessdata_dir`.
/// An init failure is logged and deferred: text-layer documents still work,
/// and scanned ones fail with the init reason.
pub fn default_ocr_engine(
    tessdata_dir: Option<&std::path::Path>,
) -> Box<dyn OcrEngine + Send + Sync> {
    #[cfg(feature = "ocr")]
    {
        match BundledTesseract::new(tessdata_dir) {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                tracing::warn!(error = %e, "Tesseract unavailable, scanned documents will fail");
                Box::new(UnavailableOcrEngine::new(e.to_string()))
            }
        }
    }

    #[cfg(not(feature = "ocr"))]
    {
        if let Some(dir) = tessdata_dir {
            tracing::debug!(dir = %dir.display(), "Ignoring tessdata directory, built without OCR");
        }
        Box::new(UnavailableOcrEngine::new(
            "scanned PDFs need OCR; rebuild with `--features ocr`",
        ))
    }
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Returns the configured page texts in order, repeating the last one.
pub struct MockOcrEngine {
    pages: Vec<String>,
    confidence: f32,
    error: Option<String>,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self::with_pages(vec![text], confidence)
    }

    pub fn with_pages(pages: Vec<&str>, confidence: f32) -> Self {
        Self {
            pages: pages.into_iter().map(String::from).collect(),
            confidence,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            pages: vec![],
            confidence: 0.0,
            error: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.error {
            return Err(ExtractionError::OcrProcessing(reason.clone()));
        }
        let text = self
            .pages
            .get(call)
            .or_else(|| self.pages.last())
            .cloned()
            .unwrap_or_default();

        Ok(OcrPageResult {
            text,
            confidence: self.confidence,
        })
    }
}
