/// Normalize extracted text before passing downstream.
/// Unifies line endings and strips control characters other than newline and tab.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_bytes() {
        let raw = "Patient: Marie\x00Dubois";
        let clean = sanitize_extracted_text(raw);
        assert!(!clean.contains('\x00'));
        assert_eq!(clean, "Patient: MarieDubois");
    }

    #[test]
    fn strips_control_characters() {
        let raw = "Dose: 500mg\x01\x02\x03\nDate: 2024-01-15";
        let clean = sanitize_extracted_text(raw);
        assert_eq!(clean, "Dose: 500mg\nDate: 2024-01-15");
    }

    #[test]
    fn normalizes_line_endings() {
        let raw = "Line one\r\nLine two\rLine three";
        assert_eq!(sanitize_extracted_text(raw), "Line one\nLine two\nLine three");
    }

    #[test]
    fn preserves_tabs_and_medical_punctuation() {
        let raw = "Temp:\t37.5°C, BP: 120/80 mmHg {normal} $5 µg";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn preserves_blank_lines() {
        let raw = "Line one\n\n\nLine two";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn empty_input() {
        assert_eq!(sanitize_extracted_text(""), "");
    }

    #[test]
    fn is_idempotent() {
        let raw = "A\x00B\r\nC\x07";
        let once = sanitize_extracted_text(raw);
        assert_eq!(sanitize_extracted_text(&once), once);
    }
}
