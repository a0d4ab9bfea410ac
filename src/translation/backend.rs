//! Base translator abstraction (spec §4.4 "Back-end policy"): a tagged
//! capability translators share — `translate`, `supported_pairs` — with a
//! direct HTTP backend and a pivot-through-English wrapper over any two
//! `BaseTranslator`s. Grounded in `pivot.py`'s two-stage
//! `MarianTranslator`-over-`MarianTranslator` composition; the teacher
//! repo's network calls (its llm/chat sidecar) are all `reqwest`-based,
//! carried over here for the translation backend's HTTP call.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::asr::post_processor::strip_artifacts;

#[derive(Debug, Clone)]
pub struct BackendResult {
    pub translated_text: String,
    pub processing_time: Duration,
}

/// Tagged capability set every translator backend implements (spec §9:
/// "Map each to a tagged variant of the capability set ... for
/// translators").
pub trait BaseTranslator: Send + Sync {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<BackendResult>;
    fn supported_pairs(&self) -> Vec<(String, String)>;
}

/// A translator backend reachable over HTTP, matching the request/response
/// shape of a LibreTranslate-compatible service.
pub struct HttpTranslator {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }
}

impl BaseTranslator for HttpTranslator {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<BackendResult> {
        let started = Instant::now();
        let request = TranslateRequest {
            q: text,
            source: source_lang,
            target: target_lang,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| anyhow!("translation backend request failed: {e}"))?
            .error_for_status()
            .map_err(|e| anyhow!("translation backend returned an error status: {e}"))?;

        let parsed: TranslateResponse = response
            .json()
            .map_err(|e| anyhow!("translation backend returned an unparseable response: {e}"))?;

        Ok(BackendResult {
            translated_text: parsed.translated_text,
            processing_time: started.elapsed(),
        })
    }

    fn supported_pairs(&self) -> Vec<(String, String)> {
        Vec::new() // an HTTP backend's supported pairs are queried at deploy time, not known statically
    }
}

/// Translates through an intermediate language when no direct model exists
/// for `source -> target` (spec §4.4: "pivots via English... when no direct
/// model exists"). Post-processes the target side through the same
/// artifact-removal regexes the ASR post-processor uses.
pub struct PivotTranslator<A: BaseTranslator, B: BaseTranslator> {
    first: A,
    second: B,
    pivot_lang: String,
}

impl<A: BaseTranslator, B: BaseTranslator> PivotTranslator<A, B> {
    pub fn new(first: A, second: B, pivot_lang: impl Into<String>) -> Self {
        Self {
            first,
            second,
            pivot_lang: pivot_lang.into(),
        }
    }
}

impl<A: BaseTranslator, B: BaseTranslator> BaseTranslator for PivotTranslator<A, B> {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<BackendResult> {
        let started = Instant::now();
        let pivot_result = self.first.translate(text, source_lang, &self.pivot_lang)?;
        let final_result = self
            .second
            .translate(&pivot_result.translated_text, &self.pivot_lang, target_lang)?;

        let cleaned = strip_artifacts(&final_result.translated_text);

        Ok(BackendResult {
            translated_text: cleaned,
            processing_time: started.elapsed(),
        })
    }

    fn supported_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A stub backend that records the `(text, source, target)` it was
    /// called with and returns a fixed translation.
    struct StubTranslator {
        output: String,
        calls: AtomicUsize,
    }

    impl StubTranslator {
        fn new(output: impl Into<String>) -> Self {
            Self {
                output: output.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BaseTranslator for StubTranslator {
        fn translate(&self, _text: &str, _source_lang: &str, _target_lang: &str) -> Result<BackendResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BackendResult {
                translated_text: self.output.clone(),
                processing_time: Duration::from_millis(1),
            })
        }

        fn supported_pairs(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    struct FailingStub;

    impl BaseTranslator for FailingStub {
        fn translate(&self, _text: &str, _source_lang: &str, _target_lang: &str) -> Result<BackendResult> {
            Err(anyhow!("backend unreachable"))
        }

        fn supported_pairs(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    #[test]
    fn pivots_through_the_intermediate_language() {
        let first = StubTranslator::new("pivot text");
        let second = StubTranslator::new("final text");
        let pivot = PivotTranslator::new(first, second, "en");

        let result = pivot.translate("texto origen", "es", "ja").unwrap();
        assert_eq!(result.translated_text, "final text");
        assert_eq!(pivot.first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pivot.second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strips_artifacts_from_the_final_hop_output() {
        let first = StubTranslator::new("pivot text");
        let second = StubTranslator::new("that's hilarious (Laughter) right?");
        let pivot = PivotTranslator::new(first, second, "en");

        let result = pivot.translate("source text", "es", "ja").unwrap();
        assert!(!result.translated_text.to_lowercase().contains("laughter"));
    }

    #[test]
    fn first_hop_failure_short_circuits_before_the_second_hop() {
        let first = FailingStub;
        let second = StubTranslator::new("unreachable output");
        let pivot = PivotTranslator::new(first, second, "en");

        assert!(pivot.translate("source text", "es", "ja").is_err());
        assert_eq!(pivot.second.calls.load(Ordering::SeqCst), 0);
    }
}
