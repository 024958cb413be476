//! Sentiment and keyword insights over stored reviews.
//!
//! One pass over the reviews for an app: classify each review's text, count
//! labels, extract keywords over all reviews and over the negative ones,
//! and turn complaint patterns that cluster in negative reviews into canned
//! recommendations.
//!
//! Classification goes through [`SentimentClassifier`] in batches. If a
//! batch fails, its reviews are retried one by one and the ones that still
//! fail are skipped (counted in `skipped`).

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use crate::config::Config;
use crate::error::{Result, ReviewError};
use crate::keywords::KeywordExtractor;
use crate::metrics::percent;
use crate::models::{AppKey, Review};
use crate::sentiment::{create_classifier, Sentiment, SentimentClassifier};
use crate::store::ReviewStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightSnapshot {
    pub app_id: String,
    pub country: String,
    pub total_reviews: usize,
    pub classified: usize,
    pub skipped: usize,
    /// Only labels that occurred.
    pub sentiment_counts: BTreeMap<Sentiment, usize>,
    /// Percent of classified reviews, two decimals.
    pub sentiment_percent: BTreeMap<Sentiment, f64>,
    pub top_keywords: Vec<String>,
    pub top_negative_keywords: Vec<String>,
    pub recommendations: Vec<String>,
}

/// A complaint pattern and the advice emitted when it clusters in negative reviews.
struct Pattern {
    regex: Regex,
    advice: &'static str,
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    [
        (
            r"\b(crash\w*|freez\w*|force[ -]?clos\w*)",
            "Fix the crashes and freezes users report, starting with the screens named in negative reviews.",
        ),
        (
            r"\b(bugs?|buggy|glitch\w*|broken|errors?)\b",
            "Triage the reported bugs and glitches and add regression tests for the most common ones.",
        ),
        (
            r"\b(slow\w*|lag\w*|loading|sluggish|performance)\b",
            "Reduce load times and lag, especially on older devices and slow networks.",
        ),
        (
            r"\b(log ?in\w*|sign ?in\w*|passwords?|accounts?|verification)\b",
            "Make login, sign-in and account recovery more reliable.",
        ),
        (
            r"\b(subscri\w*|charg\w*|refund\w*|billing|pric\w*|paywall)",
            "Clarify pricing, trials and cancellation in the app and streamline refunds.",
        ),
        (
            r"\b(ads?|advert\w*)\b",
            "Cut ad frequency and intrusiveness, or offer an ad-free option.",
        ),
        (
            r"\b(updates?|updated|new version|latest version)\b",
            "Check the latest release for regressions; complaints point at a recent update.",
        ),
    ]
    .into_iter()
    .map(|(re, advice)| Pattern {
        regex: Regex::new(&format!("(?i){}", re)).unwrap(),
        advice,
    })
    .collect()
});

pub struct InsightGenerator {
    classifier: Arc<dyn SentimentClassifier>,
    keywords: KeywordExtractor,
    top_n: usize,
    batch_size: usize,
}

impl InsightGenerator {
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        keywords: KeywordExtractor,
        top_n: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            classifier,
            keywords,
            top_n,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            create_classifier(&config.sentiment)?,
            KeywordExtractor::new(&config.insights.extra_stop_words),
            config.insights.top_keywords,
            config.sentiment.batch_size,
        ))
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Fails with [`ReviewError::InsufficientData`] when nothing is stored
    /// for `key`.
    pub async fn analyze(&self, store: &ReviewStore, key: &AppKey) -> Result<InsightSnapshot> {
        let reviews = store.all(key).await?;
        self.analyze_reviews(key, &reviews).await
    }

    pub async fn analyze_reviews(
        &self,
        key: &AppKey,
        reviews: &[Review],
    ) -> Result<InsightSnapshot> {
        if reviews.is_empty() {
            return Err(ReviewError::insufficient_data(&key.app_id, &key.country));
        }

        let texts: Vec<String> = reviews.iter().map(review_text).collect();
        let labels = self.classify_all(&texts).await;

        let mut sentiment_counts: BTreeMap<Sentiment, usize> = BTreeMap::new();
        let mut negative_texts = Vec::new();
        let mut other_texts = Vec::new();

        for (text, label) in texts.iter().zip(&labels) {
            let Some(label) = label else { continue };
            *sentiment_counts.entry(*label).or_insert(0) += 1;
            if *label == Sentiment::Negative {
                negative_texts.push(text.as_str());
            } else {
                other_texts.push(text.as_str());
            }
        }

        let classified: usize = sentiment_counts.values().sum();
        let sentiment_percent = sentiment_counts
            .iter()
            .map(|(label, n)| (*label, percent(*n as i64, classified as i64)))
            .collect();

        if classified < texts.len() {
            tracing::warn!(
                app = %key,
                skipped = texts.len() - classified,
                "some reviews could not be classified"
            );
        }

        Ok(InsightSnapshot {
            app_id: key.app_id.clone(),
            country: key.country.clone(),
            total_reviews: reviews.len(),
            classified,
            skipped: texts.len() - classified,
            sentiment_counts,
            sentiment_percent,
            top_keywords: self.keywords.top_keywords(&texts, self.top_n),
            top_negative_keywords: self.keywords.top_keywords(&negative_texts, self.top_n),
            recommendations: recommend(&negative_texts, &other_texts),
        })
    }

    async fn classify_all(&self, texts: &[String]) -> Vec<Option<Sentiment>> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            match self.classifier.classify_batch(batch).await {
                Ok(labels) if labels.len() == batch.len() => out.extend(labels),
                Ok(labels) => {
                    tracing::warn!(
                        expected = batch.len(),
                        got = labels.len(),
                        "classifier returned wrong batch size, retrying per item"
                    );
                    out.extend(self.classify_each(batch).await);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        size = batch.len(),
                        "classifier batch failed, retrying per item"
                    );
                    out.extend(self.classify_each(batch).await);
                }
            }
        }

        out
    }

    async fn classify_each(&self, texts: &[String]) -> Vec<Option<Sentiment>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let label = match self.classifier.classify_batch(std::slice::from_ref(text)).await {
                Ok(mut labels) if labels.len() == 1 => labels.pop().flatten(),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unclassifiable review");
                    None
                }
            };
            out.push(label);
        }
        out
    }
}

/// `rlens insights`: analyzes stored reviews and prints the result.
pub async fn run_insights(config: &Config, app_id: &str, country: &str) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let generator = InsightGenerator::from_config(config)?;
    let store = ReviewStore::open(&config.db).await?;
    let snap = generator.analyze(&store, &key).await;
    store.close().await;
    let snap = snap?;

    println!("insights {} ({})", key, generator.classifier_name());
    println!(
        "  classified: {} of {} (skipped {})",
        snap.classified, snap.total_reviews, snap.skipped
    );
    for (label, n) in &snap.sentiment_counts {
        let pct = snap.sentiment_percent.get(label).copied().unwrap_or(0.0);
        println!("  {:<9} {:>6}  {:>6.2}%", label, n, pct);
    }
    println!();
    println!("  keywords:          {}", snap.top_keywords.join(", "));
    println!("  negative keywords: {}", snap.top_negative_keywords.join(", "));

    if !snap.recommendations.is_empty() {
        println!();
        println!("  recommendations:");
        for rec in &snap.recommendations {
            println!("    - {}", rec);
        }
    }

    Ok(())
}

/// Title and body joined; what gets classified and mined for keywords.
fn review_text(review: &Review) -> String {
    match review.title.as_deref() {
        Some(title) if !review.body.is_empty() => format!("{}. {}", title, review.body),
        Some(title) => title.to_string(),
        None => review.body.clone(),
    }
}

/// Emits the advice of every pattern that is strictly more frequent among
/// negative reviews than among the rest. Patterns equally common on both
/// sides are skipped. Ordered by number of negative matches, then table
/// order.
pub fn recommend(negative: &[&str], other: &[&str]) -> Vec<String> {
    if negative.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<(usize, &'static str)> = PATTERNS
        .iter()
        .filter_map(|p| {
            let neg = negative.iter().filter(|t| p.regex.is_match(t)).count();
            if neg == 0 {
                return None;
            }
            let other_hits = other.iter().filter(|t| p.regex.is_match(t)).count();
            let neg_rate = neg as f64 / negative.len() as f64;
            let other_rate = if other.is_empty() {
                0.0
            } else {
                other_hits as f64 / other.len() as f64
            };
            (neg_rate > other_rate).then_some((neg, p.advice))
        })
        .collect();

    // Stable sort keeps table order among equal counts.
    hits.sort_by(|a, b| b.0.cmp(&a.0));
    hits.into_iter().map(|(_, advice)| advice.to_string()).collect()
}
