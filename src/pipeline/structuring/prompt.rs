/// Field names the service is asked to extract, with their descriptions.
pub const RECOGNIZED_FIELDS: &[(&str, &str)] = &[
    ("patient_name", "Full name of the patient"),
    ("legal_name", "Legal name if different from patient name"),
    ("date_of_birth", "Date of birth (format as YYYY-MM-DD if possible)"),
    ("pcp_name", "Primary care physician name"),
    ("chief_complaint", "Main complaint or reason for visit"),
    ("medical_history", "Relevant medical history"),
    ("medications", "List of current medications and dosage"),
    ("labs_ordered", "ALL laboratory tests that were ordered and their results"),
    ("imaging_results", "Imaging test results"),
    ("labs_imaging_abnormal", "Any abnormal lab or imaging results"),
    ("physician_notes", "Summary of what happened during the visit"),
    ("present_illness", "A list of present illnesses"),
    ("history_of_illness", "A list of past illnesses and surgeries"),
];

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a medical document scribe. Extract the following fields from the medical document text and return ONLY a valid JSON object:

Fields to extract (if present):
- patient_name: Full name of the patient
- legal_name: Legal name if different from patient name
- date_of_birth: Date of birth (format as YYYY-MM-DD if possible)
- pcp_name: Primary care physician name
- chief_complaint: Main complaint or reason for visit
- medical_history: Relevant medical history
- medications: List of current medications and dosage
- labs_ordered: ALL laboratory tests that were ordered and their results
- imaging_results: Imaging test results
- labs_imaging_abnormal: Any abnormal lab or imaging results
- physician_notes: Summary of what happened during the visit
- present_illness: A list of present illnesses
- history_of_illness: A list of past illnesses and surgeries

Return ONLY the JSON object. If a field is not found, omit it from the response. Do not include any explanatory text."#;

const USER_PROMPT_LEAD: &str = "Extract medical information from this text:";

/// Build the user message: a fixed lead-in followed by the document text verbatim.
pub fn build_extraction_prompt(document_text: &str) -> String {
    format!("{USER_PROMPT_LEAD}\n\n{document_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_document_text_verbatim() {
        let text = "  Metformin 500mg\n\n--- Page 2 ---\nBP 120/80 {x}  ";
        let prompt = build_extraction_prompt(text);
        assert!(prompt.ends_with(text));
        assert!(prompt.starts_with(USER_PROMPT_LEAD));
    }

    #[test]
    fn system_prompt_lists_every_recognized_field() {
        for (name, description) in RECOGNIZED_FIELDS {
            assert!(
                EXTRACTION_SYSTEM_PROMPT.contains(&format!("- {name}: {description}")),
                "system prompt is missing {name}"
            );
        }
    }

    #[test]
    fn system_prompt_enforces_json_only() {
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("ONLY a valid JSON object"));
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("omit it from the response"));
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("Do not include any explanatory text"));
    }
}
