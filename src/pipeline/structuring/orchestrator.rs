use super::parser::parse_structured_response;
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::types::{LlmClient, StructuredRecord};
use super::StructuringError;

/// Turns acquired document text into a structured record:
/// prompt → LLM → parse
pub struct MedicalExtractor {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl MedicalExtractor {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// One request per call. Failures are surfaced, never retried.
    pub fn extract_structured(&self, text: &str) -> Result<StructuredRecord, StructuringError> {
        let _span = tracing::info_span!("extract_structured", model = %self.model_name).entered();

        let prompt = build_extraction_prompt(text);
        tracing::info!(text_chars = text.len(), "Requesting structured extraction");

        let reply = self
            .llm
            .generate(&self.model_name, &prompt, EXTRACTION_SYSTEM_PROMPT)
            .inspect_err(|e| tracing::warn!(error = %e, "Extraction request failed"))?;

        if reply.trim().is_empty() {
            tracing::warn!("Extraction service returned an empty reply");
            return Err(StructuringError::NoStructuredData { raw_response: reply });
        }

        let record = parse_structured_response(&reply).inspect_err(|e| {
            tracing::warn!(error = %e, reply_chars = reply.len(), "Could not parse extraction reply");
        })?;

        let unrecognized = record.unrecognized_fields();
        if !unrecognized.is_empty() {
            tracing::debug!(fields = ?unrecognized, "Reply contains fields outside the prompt");
        }

        tracing::info!(fields = record.len(), "Structured extraction complete");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::pipeline::structuring::MockLlmClient;

    #[test]
    fn bare_object_reply_becomes_record() {
        let mock = MockLlmClient::new(r#"{"patient_name":"Jane Doe","date_of_birth":"1980-02-14"}"#);
        let calls = mock.call_counter();
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");

        let record = extractor.extract_structured("Patient: Jane Doe\nDOB 02/14/1980").unwrap();
        assert_eq!(record.get_str("patient_name"), Some("Jane Doe"));
        assert_eq!(record.get_str("date_of_birth"), Some("1980-02-14"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prose_wrapped_reply_is_recovered() {
        let mock = MockLlmClient::new("Here is the result:\n{\"chief_complaint\": \"cough\"}\nThanks!");
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");
        let record = extractor.extract_structured("CC: cough x3 days").unwrap();
        assert_eq!(record.get_str("chief_complaint"), Some("cough"));
    }

    #[test]
    fn request_carries_text_and_system_prompt() {
        let mock = MockLlmClient::new("{}");
        let log = mock.request_log();
        let extractor = MedicalExtractor::new(Box::new(mock), "deepseek/deepseek-r1-0528:free");

        extractor.extract_structured("BP 120/80").unwrap();

        let requests = log.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "deepseek/deepseek-r1-0528:free");
        assert_eq!(requests[0].system, EXTRACTION_SYSTEM_PROMPT);
        assert!(requests[0].prompt.ends_with("\n\nBP 120/80"));
    }

    #[test]
    fn blank_reply_is_no_structured_data() {
        let mock = MockLlmClient::new("   \n");
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");
        let err = extractor.extract_structured("some text").unwrap_err();
        assert!(matches!(err, StructuringError::NoStructuredData { .. }));
    }

    #[test]
    fn refusal_is_malformed_and_not_retried() {
        let mock = MockLlmClient::new("I cannot process medical records.");
        let calls = mock.call_counter();
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");

        match extractor.extract_structured("some text").unwrap_err() {
            StructuringError::MalformedResponse { raw_response, .. } => {
                assert_eq!(raw_response, "I cannot process medical records.");
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn service_failure_propagates_once() {
        let mock = MockLlmClient::unavailable("Cannot connect to http://127.0.0.1:1");
        let calls = mock.call_counter();
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");

        let err = extractor.extract_structured("some text").unwrap_err();
        assert_eq!(err.kind(), "service_unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrecognized_fields_are_kept() {
        let mock = MockLlmClient::new(r#"{"pcp_name":"Dr. Lee","insurance":"Acme"}"#);
        let extractor = MedicalExtractor::new(Box::new(mock), "test-model");
        let record = extractor.extract_structured("text").unwrap();
        assert_eq!(record.get_str("insurance"), Some("Acme"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn model_name_is_exposed() {
        let extractor = MedicalExtractor::new(Box::new(MockLlmClient::new("{}")), "test-model");
        assert_eq!(extractor.model_name(), "test-model");
    }
}
