//! Filler-word removal (spec §4.3), language-keyed tables taken verbatim
//! from spec.md. CJK languages match without word boundaries (their
//! tokens aren't whitespace-delimited); others use word-boundary regexes.

use regex::Regex;

const EN_FILLERS: &[&str] = &[
    "um", "uh", "like", "you know", "so", "well", "actually", "basically",
];
const ZH_FILLERS: &[&str] = &["那个", "就是", "然后", "嗯", "啊", "这个", "呃"];
const JA_FILLERS: &[&str] = &[
    "あの", "えーと", "えっと", "なんか", "まあ", "その", "えー", "あのー",
];
const FR_FILLERS: &[&str] = &["euh", "alors", "ben", "quoi", "tu sais", "voilà"];

fn is_cjk_language(lang: &str) -> bool {
    matches!(lang, "zh" | "ja")
}

fn fillers_for(lang: &str) -> &'static [&'static str] {
    match lang {
        "en" => EN_FILLERS,
        "zh" => ZH_FILLERS,
        "ja" => JA_FILLERS,
        "fr" => FR_FILLERS,
        _ => &[],
    }
}

pub fn remove_filler_words(text: &str, lang: &str) -> String {
    let fillers = fillers_for(lang);
    if fillers.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    let cjk = is_cjk_language(lang);
    for filler in fillers {
        let escaped = regex::escape(filler);
        let pattern = if cjk {
            escaped
        } else {
            format!(r"(?i)\b{escaped}\b")
        };
        if let Ok(re) = Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_english_fillers_on_word_boundaries() {
        let text = "so um I think, like, this is basically correct";
        let cleaned = remove_filler_words(text, "en");
        assert!(!cleaned.contains("um"));
        assert!(!cleaned.to_lowercase().contains("basically"));
    }

    #[test]
    fn does_not_strip_substrings_that_merely_contain_a_filler() {
        // "so" shouldn't eat "sofa"
        let cleaned = remove_filler_words("sofa so good", "en");
        assert!(cleaned.contains("sofa"));
    }

    #[test]
    fn removes_chinese_fillers_without_word_boundaries() {
        let cleaned = remove_filler_words("我觉得那个这个很好", "zh");
        assert!(!cleaned.contains("那个"));
        assert!(!cleaned.contains("这个"));
    }
}
