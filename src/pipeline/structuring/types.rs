use serde::Serialize;
use serde_json::{Map, Value};

use super::prompt::RECOGNIZED_FIELDS;
use super::StructuringError;

/// Clinical fields extracted from one document, verbatim from the service.
///
/// Always a JSON object at the top level. Absent fields are omitted, never
/// null-filled, and no schema is enforced beyond the object shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructuredRecord(Map<String, Value>);

impl StructuredRecord {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String value of a field, if present and a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Field names the extraction prompt does not ask for.
    pub fn unrecognized_fields(&self) -> Vec<&str> {
        self.fields()
            .filter(|f| !RECOGNIZED_FIELDS.iter().any(|(name, _)| name == f))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Chat-completion LLM client abstraction (allows mocking)
pub trait LlmClient {
    /// Send one system + user exchange and return the assistant's reply text.
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, StructuringError>;
}
