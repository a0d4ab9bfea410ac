//! Context coherence and language coherence checks (spec §4.3). Neither
//! rejects output outright; both scale the post-processor's quality score.

use std::collections::{HashSet, VecDeque};

const EN_COMMON: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "in", "on", "for", "that",
    "this", "it", "with", "as", "at", "by",
];
const ZH_COMMON: &[&str] = &[
    "的", "是", "了", "在", "我", "你", "他", "们", "这", "那", "和", "也", "就", "不", "有", "会",
    "都", "对", "上", "一个",
];
const JA_COMMON: &[&str] = &[
    "の", "は", "を", "に", "が", "で", "と", "も", "た", "です", "ます", "から", "まで", "より",
    "これ", "それ", "あれ", "この", "その", "あの",
];
const FR_COMMON: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "de", "du", "et", "est", "que", "qui", "à", "pour",
    "dans", "sur", "avec", "ce", "se", "il",
];

fn common_tokens_for(lang: &str) -> &'static [&'static str] {
    match lang {
        "en" => EN_COMMON,
        "zh" => ZH_COMMON,
        "ja" => JA_COMMON,
        "fr" => FR_COMMON,
        _ => &[],
    }
}

fn is_cjk_language(lang: &str) -> bool {
    matches!(lang, "zh" | "ja")
}

/// Fraction of the text plausibly "natural language" in `lang`, by common
/// function-word coverage. 1.0 when the language has no table (coverage
/// check is a no-op).
pub fn common_token_coverage(text: &str, lang: &str) -> f32 {
    let tokens = common_tokens_for(lang);
    if tokens.is_empty() || text.trim().is_empty() {
        return 1.0;
    }

    if is_cjk_language(lang) {
        let total_chars = text.chars().count().max(1);
        let mut hits = 0usize;
        for tok in tokens {
            hits += text.matches(tok).count() * tok.chars().count();
        }
        (hits as f32 / total_chars as f32).min(1.0)
    } else {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return 1.0;
        }
        let common: HashSet<&str> = tokens.iter().copied().collect();
        let hits = words
            .iter()
            .filter(|w| common.contains(w.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric()).as_str()) || common.contains(*w))
            .count();
        hits as f32 / words.len() as f32
    }
}

pub struct CoherenceTracker {
    recent: VecDeque<String>,
    window: usize,
}

impl CoherenceTracker {
    pub fn new(window: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(window.max(1)),
            window: window.max(1),
        }
    }

    /// Mean Jaccard similarity (word sets) between `current` and the last
    /// N recorded texts. `1.0` (no drop) when there is no history yet.
    pub fn similarity(&self, current: &str) -> f32 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let current_set: HashSet<&str> = current.split_whitespace().collect();
        let mut total = 0.0f32;
        for prior in &self.recent {
            let prior_set: HashSet<&str> = prior.split_whitespace().collect();
            total += jaccard(&current_set, &prior_set);
        }
        total / self.recent.len() as f32
    }

    pub fn record(&mut self, text: &str) {
        self.recent.push_back(text.to_string());
        if self.recent.len() > self.window {
            self.recent.pop_front();
        }
    }
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_coverage_detects_function_words() {
        let cov = common_token_coverage("the quick brown fox jumps over the lazy dog", "en");
        assert!(cov > 0.0);
    }

    #[test]
    fn no_history_means_full_similarity() {
        let tracker = CoherenceTracker::new(3);
        assert_eq!(tracker.similarity("hello world"), 1.0);
    }

    #[test]
    fn similarity_drops_for_unrelated_text() {
        let mut tracker = CoherenceTracker::new(3);
        tracker.record("the weather is nice today");
        let sim = tracker.similarity("quantum entanglement photon spin");
        assert!(sim < 0.5);
    }
}
