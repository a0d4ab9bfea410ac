//! Semantic gating for draft translations (spec §4.4): decide whether a
//! fragment's meaning is fixed enough to be worth translating yet.

use crate::translation::types::SkipReason;

const SOV_LANGS: &[&str] = &["ja", "ko", "de", "tr", "hi", "fa"];
const SVO_LANGS: &[&str] = &["en", "zh", "fr", "es", "it", "pt", "ru"];

const TERMINATORS: &[char] = &['.', '!', '?', '。', '!', '?', '।'];

const EN_VERBS: &[&str] = &[
    "is", "are", "was", "were", "am", "be", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "can", "could", "go", "goes", "went", "say", "says", "said", "think",
    "know", "want", "need", "make", "get", "see", "come", "take", "like",
];
const ZH_VERBS: &[&str] = &[
    "是", "有", "在", "去", "来", "说", "想", "要", "做", "看", "听", "吃", "喝", "走", "跑",
    "知道", "觉得", "会", "可以",
];
const JA_VERBS: &[&str] = &[
    "です", "ます", "した", "する", "あります", "います", "行く", "来る", "言う", "思う",
    "見る", "聞く", "できる",
];
const FR_VERBS: &[&str] = &[
    "est", "sont", "était", "suis", "es", "ai", "avons", "avez", "fait", "vais", "vas", "va",
    "dit", "pense", "veux", "peux", "peut",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetWordOrder {
    Sov,
    Svo,
    /// Not in either enumerated set; treated like SVO (verb-or-punctuation
    /// gate) since that is the more permissive, lower-risk default.
    Unknown,
}

pub fn classify_target(lang: &str) -> TargetWordOrder {
    if SOV_LANGS.contains(&lang) {
        TargetWordOrder::Sov
    } else if SVO_LANGS.contains(&lang) {
        TargetWordOrder::Svo
    } else {
        TargetWordOrder::Unknown
    }
}

fn verbs_for(lang: &str) -> &'static [&'static str] {
    match lang {
        "en" => EN_VERBS,
        "zh" => ZH_VERBS,
        "ja" => JA_VERBS,
        "fr" => FR_VERBS,
        _ => &[],
    }
}

fn is_cjk_language(lang: &str) -> bool {
    matches!(lang, "zh" | "ja")
}

fn contains_verb(text: &str, lang: &str) -> bool {
    let verbs = verbs_for(lang);
    if verbs.is_empty() {
        return false;
    }
    if is_cjk_language(lang) {
        verbs.iter().any(|v| text.contains(v))
    } else {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        verbs.iter().any(|v| words.contains(v))
    }
}

fn ends_with_terminator(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|c| TERMINATORS.contains(&c))
        .unwrap_or(false)
}

/// `Ok(())` if a draft translation of `source_text` should proceed; `Err`
/// with the skip reason otherwise. Never called for Final translations —
/// those always translate.
pub fn gate_draft(
    source_text: &str,
    source_lang: &str,
    target_lang: &str,
    min_words: usize,
) -> Result<(), SkipReason> {
    let word_count = source_text.split_whitespace().count();
    if word_count < min_words {
        return Err(SkipReason::TooShort);
    }

    match classify_target(target_lang) {
        TargetWordOrder::Sov => {
            if ends_with_terminator(source_text) {
                Ok(())
            } else {
                Err(SkipReason::SovIncomplete)
            }
        }
        TargetWordOrder::Svo | TargetWordOrder::Unknown => {
            if contains_verb(source_text, source_lang) || ends_with_terminator(source_text) {
                Ok(())
            } else {
                Err(SkipReason::NoVerbOrPunct)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sov_target_requires_terminal_punctuation() {
        assert_eq!(gate_draft("Hello", "en", "ja", 1), Err(SkipReason::SovIncomplete));
        assert_eq!(gate_draft("Hello world", "en", "ja", 1), Err(SkipReason::SovIncomplete));
        assert_eq!(gate_draft("Hello world today.", "en", "ja", 1), Ok(()));
    }

    #[test]
    fn svo_target_accepts_a_verb_without_punctuation() {
        assert_eq!(gate_draft("I want coffee", "en", "es", 1), Ok(()));
    }

    #[test]
    fn svo_target_rejects_fragment_with_no_verb_or_punct() {
        assert_eq!(
            gate_draft("the big red", "en", "es", 1),
            Err(SkipReason::NoVerbOrPunct)
        );
    }

    #[test]
    fn too_few_words_is_rejected_before_word_order_check() {
        assert_eq!(gate_draft("Hi", "en", "es", 2), Err(SkipReason::TooShort));
    }
}
