//! Artifact removal: strips parenthesized stage-directions ("(Laughter)",
//! "[Applause]", etc.) emitted by the ASR model (spec §4.3).

use once_cell::sync::Lazy;
use regex::Regex;

static STAGE_DIRECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\(\[](laughter|applause|music|cough|coughing|silence|noise|inaudible|background noise|music playing)[\)\]]")
        .expect("valid stage-direction regex")
});

pub fn strip_artifacts(text: &str) -> String {
    STAGE_DIRECTION_RE.replace_all(text, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_laughter_and_applause_case_insensitively() {
        let text = "That's hilarious (Laughter) right? [APPLAUSE] yes.";
        let cleaned = strip_artifacts(text);
        assert!(!cleaned.to_lowercase().contains("laughter"));
        assert!(!cleaned.to_lowercase().contains("applause"));
    }

    #[test]
    fn leaves_ordinary_parentheticals_alone() {
        let text = "the result (approximately) matched.";
        assert_eq!(strip_artifacts(text), text);
    }
}
