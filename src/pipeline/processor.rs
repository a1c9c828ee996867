//! Document pipeline: path check → text acquisition → structured extraction.
//!
//! Engines are injected as trait objects (`PdfBackend`, `OcrEngine`,
//! `LlmClient`) so the whole run is testable with mocks. Every failure is
//! terminal and surfaces as one `PipelineError`; `PipelineReport` renders the
//! outcome as the single JSON document the binary prints.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::pipeline::extraction::{
    AcquiredText, ExtractionError, ExtractionMethod, OcrEngine, PdfiumBackend, TextAcquirer,
};
use crate::pipeline::structuring::{
    MedicalExtractor, OpenRouterClient, StructuredRecord, StructuringError,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No file path provided")]
    MissingArgument,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("File not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Failed to extract text from PDF: {0}")]
    Acquisition(ExtractionError),

    #[error("No text could be extracted from the document ({method})")]
    EmptyExtraction { method: ExtractionMethod },

    #[error("Failed to extract structured data: {0}")]
    Extraction(#[from] StructuringError),
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::NoTextExtracted { method } => Self::EmptyExtraction { method },
            other => Self::Acquisition(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument => "missing_argument",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::PathNotFound(_) => "path_not_found",
            Self::Acquisition(_) => "acquisition_failure",
            Self::EmptyExtraction { .. } => "empty_extraction",
            Self::Extraction(e) => e.kind(),
        }
    }

    /// Human-readable summary, without the raw payload.
    pub fn message(&self) -> String {
        match self {
            Self::MissingArgument
            | Self::InvalidArguments(_)
            | Self::PathNotFound(_)
            | Self::EmptyExtraction { .. } => self.to_string(),
            Self::Acquisition(_) => "Failed to extract text from PDF".to_string(),
            Self::Extraction(StructuringError::ServiceUnavailable { .. }) => {
                "Extraction service unavailable".to_string()
            }
            Self::Extraction(StructuringError::NoStructuredData { .. }) => {
                "Extraction service returned no structured data".to_string()
            }
            Self::Extraction(StructuringError::MalformedResponse { detail, .. }) => {
                format!("Failed to parse structured data: {detail}")
            }
        }
    }

    /// Raw diagnostic payload (library error text or the service's reply).
    pub fn details(&self) -> Option<String> {
        match self {
            Self::MissingArgument
            | Self::InvalidArguments(_)
            | Self::PathNotFound(_)
            | Self::EmptyExtraction { .. } => None,
            Self::Acquisition(e) => Some(e.to_string()),
            Self::Extraction(e) => Some(e.details().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Machine-readable outcome of one run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineReport {
    Success {
        data: StructuredRecord,
    },
    Error {
        kind: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl PipelineReport {
    pub fn from_result(result: Result<StructuredRecord, PipelineError>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_error(err: &PipelineError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.message(),
            details: err.details(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "kind": "report_serialization",
                "message": format!("Failed to serialize report: {e}"),
            })
            .to_string()
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Pipeline {
    acquirer: TextAcquirer,
    extractor: MedicalExtractor,
}

impl Pipeline {
    pub fn new(acquirer: TextAcquirer, extractor: MedicalExtractor) -> Self {
        Self {
            acquirer,
            extractor,
        }
    }

    /// Production wiring: PDFium, the given OCR engine and the hosted service.
    pub fn from_config(
        config: &ServiceConfig,
        ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    ) -> Result<Self, PipelineError> {
        // Load failures resurface per document as acquisition errors.
        if let Err(e) = PdfiumBackend::new() {
            tracing::warn!(error = %e, "PDFium library not loadable");
        }

        let llm = OpenRouterClient::new(config)?;
        tracing::debug!(?config, "Extraction service configured");

        Ok(Self::new(
            TextAcquirer::new(Box::new(PdfiumBackend), ocr_engine),
            MedicalExtractor::new(Box::new(llm), &config.model),
        ))
    }

    /// Full run for one document.
    pub fn run(&self, path: &Path) -> Result<StructuredRecord, PipelineError> {
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!("pipeline", run_id = %run_id).entered();

        let acquired = self.acquire_only(path)?;

        tracing::info!(
            stage = "extracting",
            method = %acquired.method,
            text_chars = acquired.text.len(),
            "Text acquired"
        );
        let record = self.extractor.extract_structured(&acquired.text)?;

        tracing::info!(stage = "extracted", fields = record.len(), "Pipeline complete");
        Ok(record)
    }

    /// Path check and text acquisition only; the service is never contacted.
    pub fn acquire_only(&self, path: &Path) -> Result<AcquiredText, PipelineError> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "Input path does not exist");
            return Err(PipelineError::PathNotFound(path.to_path_buf()));
        }

        tracing::info!(stage = "acquiring", path = %path.display(), "Starting text acquisition");
        let acquired = self.acquirer.acquire_text(path).inspect_err(|e| {
            tracing::warn!(stage = "acquisition_failed", error = %e, "Text acquisition failed");
        })?;

        Ok(acquired)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
