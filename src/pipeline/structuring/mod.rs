pub mod types;
pub mod prompt;
pub mod parser;
pub mod openrouter;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use openrouter::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Extraction service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Extraction service returned no structured data")]
    NoStructuredData { raw_response: String },

    #[error("Malformed extraction response: {detail}")]
    MalformedResponse { raw_response: String, detail: String },
}

impl StructuringError {
    /// Stable snake_case tag for machine-readable reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::NoStructuredData { .. } => "no_structured_data",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }

    /// Raw diagnostic payload: the service error text or the model's reply.
    pub fn details(&self) -> &str {
        match self {
            Self::ServiceUnavailable { reason } => reason,
            Self::NoStructuredData { raw_response } => raw_response,
            Self::MalformedResponse { raw_response, .. } => raw_response,
        }
    }
}
