//! Sentiment classification.
//!
//! The insight pipeline only sees the [`SentimentClassifier`] trait: text in,
//! label out, in batches. Two implementations ship:
//!
//! - **[`LexiconClassifier`]** — word-list scorer. No network, deterministic,
//!   the default.
//! - **[`HttpClassifier`]** — posts batches to a hosted text-classification
//!   endpoint (HuggingFace inference API shape) running a pretrained
//!   sentiment model.
//!
//! Use [`create_classifier`] to build the one selected by `[sentiment]`.
//!
//! # Retry Strategy
//!
//! The HTTP classifier retries HTTP 429, 5xx and network errors with
//! exponential backoff (1s, 2s, 4s, …) up to `max_retries`; other 4xx fail
//! the batch immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::config::SentimentConfig;

/// Longest text sent to a model; longer reviews are cut on a char boundary.
const MAX_INPUT_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Maps a model label onto the three classes. Handles named labels
    /// (`"negative"`, `"POS"`) and index labels (`"LABEL_0"` … `"LABEL_2"`).
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("neg") || label.ends_with("_0") {
            Self::Negative
        } else if label.contains("pos") || label.ends_with("_2") {
            Self::Positive
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text → sentiment label.
///
/// `classify_batch` returns one entry per input, in order. `None` marks an
/// input the classifier could not label; callers skip it. An `Err` means the
/// whole batch failed.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>>;
}

pub fn create_classifier(config: &SentimentConfig) -> Result<Arc<dyn SentimentClassifier>> {
    match config.provider.as_str() {
        "lexicon" => Ok(Arc::new(LexiconClassifier::new())),
        "http" => Ok(Arc::new(HttpClassifier::new(config)?)),
        other => bail!("Unknown sentiment provider: {}", other),
    }
}

// ============ Lexicon Classifier ============

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "best", "easy", "excellent", "fantastic", "fast", "fun", "good",
    "great", "helpful", "intuitive", "love", "loved", "loves", "nice", "perfect", "recommend",
    "reliable", "smooth", "useful", "wonderful", "works",
];

const NEGATIVE_WORDS: &[&str] = &[
    "annoying", "awful", "bad", "broken", "bug", "buggy", "bugs", "crash", "crashes", "crashed",
    "crashing", "disappointed", "disappointing", "error", "errors", "fail", "fails", "freezes",
    "frustrating", "garbage", "glitch", "hate", "horrible", "lag", "laggy", "poor", "refund",
    "scam", "slow", "terrible", "unusable", "useless", "waste", "worse", "worst",
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "dont", "don't", "doesnt", "doesn't", "cant", "can't", "isnt", "isn't",
];

static POSITIVE: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| POSITIVE_WORDS.iter().copied().collect());
static NEGATIVE: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| NEGATIVE_WORDS.iter().copied().collect());

/// Counts positive and negative words; a negator directly before a word
/// flips it. Net score > 0 is positive, < 0 negative, 0 neutral.
#[derive(Debug, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> Sentiment {
        let mut score = 0i32;
        let mut negate = false;

        for token in text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let polarity = if POSITIVE.contains(token.as_str()) {
                1
            } else if NEGATIVE.contains(token.as_str()) {
                -1
            } else {
                0
            };

            if polarity != 0 {
                score += if negate { -polarity } else { polarity };
                negate = false;
            } else {
                negate = NEGATORS.contains(&token.as_str());
            }
        }

        match score.signum() {
            1 => Sentiment::Positive,
            -1 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[async_trait]
impl SentimentClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>> {
        Ok(texts.iter().map(|t| Some(self.classify_text(t))).collect())
    }
}

// ============ HTTP Classifier ============

/// Hosted text-classification model.
///
/// Sends `{"inputs": [...]}` to the endpoint and expects, per input, either
/// a list of `{label, score}` candidates or a single `{label, score}`. The
/// highest-scoring label wins. Reads an optional bearer token from
/// `HF_API_TOKEN`.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: Option<String>,
    max_retries: u32,
}

impl HttpClassifier {
    pub fn new(config: &SentimentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url(),
            model: config.model.clone(),
            token: std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
        })
    }

    async fn post_with_retry(&self, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&self.endpoint).json(body);
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "classifier error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("classifier error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("classification failed after retries")))
    }
}

#[async_trait]
impl SentimentClassifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>> {
        // Empty text never reaches the model.
        let pending: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, truncate_chars(t, MAX_INPUT_CHARS)))
            .collect();

        let mut out: Vec<Option<Sentiment>> = vec![Some(Sentiment::Neutral); texts.len()];
        if pending.is_empty() {
            return Ok(out);
        }

        let inputs: Vec<&str> = pending.iter().map(|(_, t)| t.as_str()).collect();
        let json = self
            .post_with_retry(&serde_json::json!({ "inputs": inputs }))
            .await?;
        let labels = parse_classification_response(&json, pending.len())?;

        for ((idx, _), label) in pending.iter().zip(labels) {
            out[*idx] = label;
        }
        Ok(out)
    }
}

/// Parses a text-classification response into one optional label per input.
pub fn parse_classification_response(
    json: &Value,
    expected: usize,
) -> Result<Vec<Option<Sentiment>>> {
    let items = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("invalid classifier response: expected an array"))?;

    // A single input may come back unwrapped as `[{label, score}, ...]`.
    let per_input: Vec<&Value> = if expected == 1 && items.first().is_some_and(|v| v.is_object()) {
        vec![json]
    } else {
        items.iter().collect()
    };

    if per_input.len() != expected {
        bail!(
            "invalid classifier response: {} results for {} inputs",
            per_input.len(),
            expected
        );
    }

    Ok(per_input.into_iter().map(best_label).collect())
}

fn best_label(candidates: &Value) -> Option<Sentiment> {
    let best = match candidates {
        Value::Array(list) => list
            .iter()
            .filter_map(|c| Some((c.get("label")?.as_str()?, c.get("score")?.as_f64()?)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(label, _)| label),
        Value::Object(_) => candidates.get("label").and_then(|l| l.as_str()),
        _ => None,
    };
    best.map(Sentiment::from_label)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_normalization() {
        assert_eq!(Sentiment::from_label("negative"), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("NEG"), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("LABEL_0"), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("Positive"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("LABEL_2"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("LABEL_1"), Sentiment::Neutral);
        assert_eq!(Sentiment::from_label("neutral"), Sentiment::Neutral);
    }

    #[test]
    fn test_lexicon_basic() {
        let c = LexiconClassifier::new();
        assert_eq!(c.classify_text("I love this app, works great"), Sentiment::Positive);
        assert_eq!(c.classify_text("Crashes every time. Terrible."), Sentiment::Negative);
        assert_eq!(c.classify_text("It is an app."), Sentiment::Neutral);
        assert_eq!(c.classify_text(""), Sentiment::Neutral);
    }

    #[test]
    fn test_lexicon_negation() {
        let c = LexiconClassifier::new();
        assert_eq!(c.classify_text("not good"), Sentiment::Negative);
        assert_eq!(c.classify_text("never slow"), Sentiment::Positive);
    }

    #[tokio::test]
    async fn test_lexicon_batch_keeps_order() {
        let c = LexiconClassifier::new();
        let texts = vec!["great".to_string(), "awful".to_string(), "ok".to_string()];
        let labels = c.classify_batch(&texts).await.unwrap();
        assert_eq!(
            labels,
            vec![
                Some(Sentiment::Positive),
                Some(Sentiment::Negative),
                Some(Sentiment::Neutral)
            ]
        );
    }

    #[test]
    fn test_parse_batched_response() {
        let resp = json!([
            [{ "label": "negative", "score": 0.9 }, { "label": "positive", "score": 0.1 }],
            [{ "label": "LABEL_2", "score": 0.7 }, { "label": "LABEL_1", "score": 0.2 }],
            []
        ]);
        let labels = parse_classification_response(&resp, 3).unwrap();
        assert_eq!(
            labels,
            vec![Some(Sentiment::Negative), Some(Sentiment::Positive), None]
        );
    }

    #[test]
    fn test_parse_unwrapped_single_response() {
        let resp = json!([
            { "label": "neutral", "score": 0.8 },
            { "label": "positive", "score": 0.2 }
        ]);
        let labels = parse_classification_response(&resp, 1).unwrap();
        assert_eq!(labels, vec![Some(Sentiment::Neutral)]);
    }

    #[test]
    fn test_parse_length_mismatch_fails() {
        let resp = json!([[{ "label": "neutral", "score": 0.8 }]]);
        assert!(parse_classification_response(&resp, 2).is_err());
        assert!(parse_classification_response(&json!({ "error": "loading" }), 1).is_err());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_create_classifier() {
        let config = SentimentConfig::default();
        assert_eq!(create_classifier(&config).unwrap().name(), "lexicon");
    }
}
