//! Draft deduplication for the UI (spec §4.3): a draft is not additive —
//! each draft replaces the prior one — but the UI only wants to redraw the
//! new suffix when the new draft is a near-extension of the old one.

use crate::asr::types::DraftDisplay;
use crate::text_match::longest_matching_block;

pub fn dedup_display(previous: &str, current: &str, similarity_threshold: f32) -> DraftDisplay {
    let previous = previous.trim();
    let current = current.trim();

    if current == previous {
        return DraftDisplay::Suffix(String::new());
    }

    let prev_words: Vec<&str> = previous.split_whitespace().collect();
    let curr_words: Vec<&str> = current.split_whitespace().collect();

    if prev_words.is_empty() {
        return DraftDisplay::Full(current.to_string());
    }

    let (start_a, start_b, len) = longest_matching_block(&prev_words, &curr_words);
    if start_a == 0 && start_b == 0 {
        let ratio = len as f32 / prev_words.len() as f32;
        if ratio >= similarity_threshold && len < curr_words.len() {
            let suffix = curr_words[len..].join(" ");
            return DraftDisplay::Suffix(suffix);
        }
    }

    DraftDisplay::Full(current.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_drafts_produce_bare_ellipsis() {
        let d = dedup_display("hello there", "hello there", 0.8);
        assert_eq!(d.rendered(), "…");
    }

    #[test]
    fn extension_produces_ellipsis_plus_suffix() {
        let d = dedup_display("hello there", "hello there friend", 0.8);
        assert_eq!(d, DraftDisplay::Suffix("friend".to_string()));
        assert_eq!(d.rendered(), "…friend");
    }

    #[test]
    fn major_rewrite_falls_back_to_full() {
        let d = dedup_display("hello there", "completely different sentence", 0.8);
        assert_eq!(d, DraftDisplay::Full("completely different sentence".to_string()));
    }

    #[test]
    fn first_draft_has_no_previous() {
        let d = dedup_display("", "hello there", 0.8);
        assert_eq!(d, DraftDisplay::Full("hello there".to_string()));
    }
}
