//! Review fetching: upstream sources, fallback, cleaning and sampling.
//!
//! A [`Fetcher`] holds an ordered list of [`ReviewFeed`] strategies. Each
//! strategy is asked for a pool of raw records; the first one that yields a
//! non-empty pool after cleaning wins, and a uniform random sample of the
//! requested size is drawn from it. When every strategy fails the caller gets
//! [`ReviewError::SourceUnavailable`] with one reason per attempt.
//!
//! ```text
//! SourceMode::Auto  →  [scraper, rss]
//!                          │ Err / empty
//!                          └──────────▶ rss ──▶ pool ──▶ dedup ──▶ sample(how_many)
//! ```
//!
//! The pool is deliberately larger than `how_many` (`how_many * pool_factor`)
//! because both upstreams return newest-first.

pub mod rss;
pub mod scraper;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::DateTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::{Result, ReviewError};
use crate::models::{AppKey, RawReview, Review, SourceKind, SourceMode};
use crate::text::{clean_optional, clean_text};

pub use rss::RssFeed;
pub use scraper::ScraperFeed;

/// What a feed is asked for.
#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub key: AppKey,
    /// Stop paging once this many raw records are collected.
    pub pool_target: usize,
}

/// One upstream review source.
///
/// Implementations page through their upstream until `pool_target` records
/// are collected or the upstream runs out. Returning `Ok` with a partial
/// pool is fine; returning `Err` (or an empty pool) makes the [`Fetcher`]
/// move on to the next strategy.
#[async_trait]
pub trait ReviewFeed: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch_pool(&self, query: &FetchQuery) -> AnyResult<Vec<RawReview>>;
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Strategy that produced the pool.
    pub source: SourceKind,
    /// Distinct clean records in the pool before sampling.
    pub pool_size: usize,
    /// Raw records dropped during cleaning (missing id or rating, duplicates).
    pub dropped: usize,
    pub reviews: Vec<Review>,
}

pub struct Fetcher {
    feeds: Vec<Box<dyn ReviewFeed>>,
    pool_factor: usize,
}

impl Fetcher {
    pub fn new(feeds: Vec<Box<dyn ReviewFeed>>, pool_factor: usize) -> Self {
        Self {
            feeds,
            pool_factor: pool_factor.max(1),
        }
    }

    /// Builds the strategy list for `mode` against the configured upstreams.
    pub fn from_config(config: &FetchConfig, mode: SourceMode) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let feeds: Vec<Box<dyn ReviewFeed>> = mode
            .strategies()
            .into_iter()
            .map(|kind| -> Box<dyn ReviewFeed> {
                match kind {
                    SourceKind::Scraper => Box::new(ScraperFeed::new(client.clone(), config)),
                    SourceKind::Rss => Box::new(RssFeed::new(client.clone(), config)),
                }
            })
            .collect();

        Ok(Self::new(feeds, config.pool_factor))
    }

    pub fn strategies(&self) -> Vec<SourceKind> {
        self.feeds.iter().map(|f| f.kind()).collect()
    }

    pub async fn fetch(&self, key: &AppKey, how_many: usize) -> Result<FetchOutcome> {
        let mut rng = StdRng::from_entropy();
        self.fetch_with_rng(key, how_many, &mut rng).await
    }

    pub async fn fetch_with_rng<R: Rng + Send + ?Sized>(
        &self,
        key: &AppKey,
        how_many: usize,
        rng: &mut R,
    ) -> Result<FetchOutcome> {
        if how_many == 0 {
            return Err(ReviewError::validation("how_many", "must be >= 1"));
        }

        let query = FetchQuery {
            key: key.clone(),
            pool_target: how_many.saturating_mul(self.pool_factor),
        };

        let mut attempts = Vec::new();

        for feed in &self.feeds {
            let kind = feed.kind();
            let raw = match feed.fetch_pool(&query).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(source = %kind, app = %key, error = %e, "review source failed");
                    attempts.push(format!("{}: {}", kind, e));
                    continue;
                }
            };

            let raw_count = raw.len();
            let pool = clean_pool(raw, key, kind);
            if pool.is_empty() {
                tracing::warn!(
                    source = %kind,
                    app = %key,
                    raw = raw_count,
                    "review source returned no usable records"
                );
                attempts.push(format!("{}: empty result", kind));
                continue;
            }

            let pool_size = pool.len();
            let reviews = sample(pool, how_many, rng);
            tracing::info!(
                source = %kind,
                app = %key,
                raw = raw_count,
                pool = pool_size,
                sampled = reviews.len(),
                "fetched reviews"
            );

            return Ok(FetchOutcome {
                source: kind,
                pool_size,
                dropped: raw_count - pool_size,
                reviews,
            });
        }

        Err(ReviewError::SourceUnavailable { attempts })
    }
}

/// Cleans every raw record and drops unusable ones and repeated review ids.
pub fn clean_pool(raw: Vec<RawReview>, key: &AppKey, source: SourceKind) -> Vec<Review> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|r| normalize(r, key, source))
        .filter(|r| seen.insert(r.review_id.clone()))
        .collect()
}

/// Cleans one raw record. Returns `None` when the review id is empty or
/// the rating is missing, non-finite, or rounds below 1. Ratings above 5
/// are clamped.
pub fn normalize(raw: RawReview, key: &AppKey, source: SourceKind) -> Option<Review> {
    let review_id = raw
        .review_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())?;

    let rating = raw.rating.filter(|r| r.is_finite())?.round();
    if rating < 1.0 {
        return None;
    }
    let rating = rating.min(5.0) as i64;

    let submitted_at = raw
        .submitted_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.timestamp());

    Some(Review {
        app_id: key.app_id.clone(),
        country: key.country.clone(),
        review_id,
        author: clean_optional(raw.author.as_deref()),
        title: clean_optional(raw.title.as_deref()),
        body: clean_text(raw.body.as_deref().unwrap_or("")),
        rating,
        version: clean_optional(raw.version.as_deref()),
        submitted_at,
        source,
    })
}

/// Uniform sample without replacement; the whole pool when it is smaller.
pub fn sample<R: Rng + ?Sized>(mut pool: Vec<Review>, how_many: usize, rng: &mut R) -> Vec<Review> {
    if pool.len() > how_many {
        pool.shuffle(rng);
        pool.truncate(how_many);
    }
    pool
}

/// Fills `{country}`, `{app_id}`, `{page}` and `{offset}` in a URL template.
pub(crate) fn expand_url(template: &str, key: &AppKey, page: u32, offset: usize) -> String {
    template
        .replace("{country}", &key.country)
        .replace("{app_id}", &key.app_id)
        .replace("{page}", &page.to_string())
        .replace("{offset}", &offset.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn key() -> AppKey {
        AppKey::new("284882215", "us").unwrap()
    }

    fn raw(id: &str, rating: f64) -> RawReview {
        RawReview {
            review_id: Some(id.to_string()),
            author: Some("someone".into()),
            title: Some("<i>Title</i>".into()),
            body: Some("Body  text".into()),
            rating: Some(rating),
            version: Some("1.2.3".into()),
            submitted_at: Some("2024-03-01T12:00:00-07:00".into()),
        }
    }

    fn pool(n: usize) -> Vec<RawReview> {
        (0..n).map(|i| raw(&format!("r{}", i), 1.0 + (i % 5) as f64)).collect()
    }

    struct StaticFeed {
        kind: SourceKind,
        result: std::result::Result<Vec<RawReview>, String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReviewFeed for StaticFeed {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch_pool(&self, _query: &FetchQuery) -> AnyResult<Vec<RawReview>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn feed(
        kind: SourceKind,
        result: std::result::Result<Vec<RawReview>, String>,
    ) -> (Box<dyn ReviewFeed>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StaticFeed {
                kind,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_normalize_cleans_fields() {
        let review = normalize(raw(" abc ", 4.0), &key(), SourceKind::Rss).unwrap();
        assert_eq!(review.review_id, "abc");
        assert_eq!(review.title.as_deref(), Some("Title"));
        assert_eq!(review.body, "Body text");
        assert_eq!(review.rating, 4);
        assert_eq!(review.submitted_at, Some(1709319600));
        assert_eq!(review.country, "us");
    }

    #[test]
    fn test_normalize_rating_rules() {
        let k = key();
        assert_eq!(normalize(raw("a", 7.0), &k, SourceKind::Rss).unwrap().rating, 5);
        assert_eq!(normalize(raw("a", 2.6), &k, SourceKind::Rss).unwrap().rating, 3);
        assert!(normalize(raw("a", 0.0), &k, SourceKind::Rss).is_none());
        assert!(normalize(raw("a", f64::NAN), &k, SourceKind::Rss).is_none());

        let mut missing = raw("a", 3.0);
        missing.rating = None;
        assert!(normalize(missing, &k, SourceKind::Rss).is_none());
    }

    #[test]
    fn test_normalize_drops_missing_id() {
        let mut r = raw("  ", 3.0);
        assert!(normalize(r.clone(), &key(), SourceKind::Rss).is_none());
        r.review_id = None;
        assert!(normalize(r, &key(), SourceKind::Rss).is_none());
    }

    #[test]
    fn test_bad_date_is_best_effort() {
        let mut r = raw("a", 3.0);
        r.submitted_at = Some("yesterday".into());
        let review = normalize(r, &key(), SourceKind::Scraper).unwrap();
        assert_eq!(review.submitted_at, None);
    }

    #[test]
    fn test_sample_100_of_500_unique() {
        let clean = clean_pool(pool(500), &key(), SourceKind::Rss);
        assert_eq!(clean.len(), 500);
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = sample(clean, 100, &mut rng);
        assert_eq!(sampled.len(), 100);
        let ids: HashSet<_> = sampled.iter().map(|r| r.review_id.clone()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_sample_small_pool_returned_whole() {
        let clean = clean_pool(pool(3), &key(), SourceKind::Rss);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample(clean, 10, &mut rng).len(), 3);
    }

    #[test]
    fn test_clean_pool_dedups_ids() {
        let mut raws = pool(5);
        raws.push(raw("r0", 5.0));
        let clean = clean_pool(raws, &key(), SourceKind::Rss);
        assert_eq!(clean.len(), 5);
    }

    #[tokio::test]
    async fn test_fallback_to_second_strategy() {
        let (scraper, scraper_calls) = feed(SourceKind::Scraper, Err("HTTP 429".into()));
        let (rss, rss_calls) = feed(SourceKind::Rss, Ok(pool(20)));
        let fetcher = Fetcher::new(vec![scraper, rss], 5);

        let mut rng = StdRng::seed_from_u64(3);
        let outcome = fetcher.fetch_with_rng(&key(), 10, &mut rng).await.unwrap();
        assert_eq!(outcome.source, SourceKind::Rss);
        assert_eq!(outcome.reviews.len(), 10);
        assert_eq!(outcome.pool_size, 20);
        assert_eq!(scraper_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rss_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let (scraper, _) = feed(SourceKind::Scraper, Ok(pool(4)));
        let (rss, rss_calls) = feed(SourceKind::Rss, Ok(pool(20)));
        let fetcher = Fetcher::new(vec![scraper, rss], 5);

        let outcome = fetcher.fetch(&key(), 10).await.unwrap();
        assert_eq!(outcome.source, SourceKind::Scraper);
        assert_eq!(outcome.reviews.len(), 4);
        assert_eq!(rss_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_pool_counts_as_failure() {
        let mut unusable = raw("x", 0.0);
        unusable.rating = None;
        let (scraper, _) = feed(SourceKind::Scraper, Ok(vec![unusable]));
        let (rss, _) = feed(SourceKind::Rss, Err("connection refused".into()));
        let fetcher = Fetcher::new(vec![scraper, rss], 5);

        match fetcher.fetch(&key(), 10).await {
            Err(ReviewError::SourceUnavailable { attempts }) => {
                assert_eq!(
                    attempts,
                    vec![
                        "scraper: empty result".to_string(),
                        "rss: connection refused".to_string()
                    ]
                );
            }
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|o| o.source)),
        }
    }

    #[tokio::test]
    async fn test_dropped_counts_unusable_records() {
        let mut raws = pool(6);
        raws.push(RawReview::default());
        raws.push(raw("r1", 2.0));
        let (rss, _) = feed(SourceKind::Rss, Ok(raws));
        let fetcher = Fetcher::new(vec![rss], 5);

        let outcome = fetcher.fetch(&key(), 100).await.unwrap();
        assert_eq!(outcome.pool_size, 6);
        assert_eq!(outcome.dropped, 2);
    }

    #[test]
    fn test_expand_url() {
        let url = expand_url(
            "https://x/{country}/page={page}/id={app_id}?offset={offset}",
            &key(),
            2,
            40,
        );
        assert_eq!(url, "https://x/us/page=2/id=284882215?offset=40");
    }

    #[test]
    fn test_from_config_follows_mode() {
        let cfg = FetchConfig::default();
        let fetcher = Fetcher::from_config(&cfg, SourceMode::Auto).unwrap();
        assert_eq!(fetcher.strategies(), vec![SourceKind::Scraper, SourceKind::Rss]);
        let fetcher = Fetcher::from_config(&cfg, SourceMode::Only(SourceKind::Rss)).unwrap();
        assert_eq!(fetcher.strategies(), vec![SourceKind::Rss]);
    }
}
