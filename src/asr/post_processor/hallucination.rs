//! Hallucination detector (spec §4.3). Four independent rules; text is
//! rejected if any fires. Thresholds are configuration knobs, not hard-coded
//! constants (spec §9 Design Notes).

use crate::config::PipelineConfig;

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp) // CJK unified ideographs
        || (0x3040..=0x309F).contains(&cp) // Hiragana
        || (0xAC00..=0xD7AF).contains(&cp) // Hangul
}

fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Rule (a): a 2-20 character sub-sequence repeating >= threshold times
/// consecutively.
fn has_repeating_char_sequence(text: &str, min_unit: usize, max_unit: usize, count_threshold: usize) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n < min_unit * count_threshold {
        return false;
    }
    for unit_len in min_unit..=max_unit.min(n / count_threshold.max(1)) {
        if unit_len == 0 {
            continue;
        }
        let span = unit_len * count_threshold;
        if span > n {
            continue;
        }
        let mut i = 0;
        while i + span <= n {
            let unit = &chars[i..i + unit_len];
            let mut repeats = 1;
            let mut j = i + unit_len;
            while j + unit_len <= n && chars[j..j + unit_len] == *unit {
                repeats += 1;
                j += unit_len;
            }
            if repeats >= count_threshold {
                return true;
            }
            i += 1;
        }
    }
    false
}

/// Rule (b): a single word repeated in > threshold of tokens of a
/// length->=5 sentence.
fn has_dominant_word_repetition(words: &[&str], threshold: f32) -> bool {
    if words.len() < 5 {
        return false;
    }
    let mut counts = std::collections::HashMap::new();
    for w in words {
        *counts.entry(w.to_lowercase()).or_insert(0usize) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    (max_count as f32 / words.len() as f32) > threshold
}

/// Rule (c): word diversity below threshold for texts longer than
/// `min_len` characters.
fn has_low_word_diversity(text: &str, words: &[&str], threshold: f32, min_len: usize) -> bool {
    if text.chars().count() <= min_len || words.is_empty() {
        return false;
    }
    let unique: std::collections::HashSet<String> =
        words.iter().map(|w| w.to_lowercase()).collect();
    (unique.len() as f32 / words.len() as f32) < threshold
}

/// Rule (d): for non-CJK text, a single alphabetic character dominating
/// non-space positions. Requires both an absolute repeat count of at least
/// `min_count` and a ratio above `threshold` — the ratio alone wrongly
/// flags short strings where one character happens to cross the ratio (a
/// 2-character string is 100% dominated by either character).
fn has_dominant_single_char(text: &str, threshold: f32, min_count: usize) -> bool {
    if contains_cjk(text) {
        return false;
    }
    let non_space: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if non_space.is_empty() {
        return false;
    }
    let mut counts = std::collections::HashMap::new();
    for c in &non_space {
        if c.is_alphabetic() {
            *counts.entry(c.to_ascii_lowercase()).or_insert(0usize) += 1;
        }
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    max_count >= min_count && (max_count as f32 / non_space.len() as f32) > threshold
}

pub fn is_hallucination(text: &str, config: &PipelineConfig) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let words: Vec<&str> = text.split_whitespace().collect();

    has_repeating_char_sequence(
        text,
        config.hallucination_min_repeat_unit,
        config.hallucination_max_repeat_unit,
        config.hallucination_repeat_count_threshold,
    ) || has_dominant_word_repetition(&words, config.hallucination_word_repetition_threshold)
        || has_low_word_diversity(
            text,
            &words,
            config.hallucination_word_diversity_threshold,
            config.hallucination_word_diversity_min_len,
        )
        || has_dominant_single_char(
            text,
            config.hallucination_single_char_threshold,
            config.hallucination_single_char_min_len,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_repeating_character_sequence() {
        let cfg = PipelineConfig::default();
        let text = "ab".repeat(8);
        assert!(is_hallucination(&text, &cfg));
    }

    #[test]
    fn detects_dominant_word_repetition() {
        let cfg = PipelineConfig::default();
        let text = "the the the the the quick";
        assert!(is_hallucination(text, &cfg));
    }

    #[test]
    fn normal_sentence_is_not_a_hallucination() {
        let cfg = PipelineConfig::default();
        let text = "the quick brown fox jumps over the lazy dog";
        assert!(!is_hallucination(text, &cfg));
    }

    #[test]
    fn short_string_crossing_the_ratio_alone_is_not_flagged() {
        let cfg = PipelineConfig::default();
        // "aa" is 100% dominated by 'a' but far below the absolute count
        // guard, so it must not be treated as a hallucination.
        assert!(!has_dominant_single_char(
            "aa",
            cfg.hallucination_single_char_threshold,
            cfg.hallucination_single_char_min_len
        ));
    }

    #[test]
    fn long_run_of_a_single_character_is_flagged() {
        let cfg = PipelineConfig::default();
        let text = "a".repeat(20);
        assert!(has_dominant_single_char(
            &text,
            cfg.hallucination_single_char_threshold,
            cfg.hallucination_single_char_min_len
        ));
    }

    #[test]
    fn cjk_text_is_exempt_from_single_char_rule() {
        let cfg = PipelineConfig::default();
        let text = "你好你好你好你好你好你好你好你好你好你好你好你好";
        // still caught by repeating-sequence or diversity rules, but not by
        // the single-char rule specifically
        assert!(!has_dominant_single_char(
            text,
            cfg.hallucination_single_char_threshold,
            cfg.hallucination_single_char_min_len
        ));
    }
}
