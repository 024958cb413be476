//! Collection pipeline: fetch a sample from upstream, then store it.
//!
//! Shared by `POST /collect` and `rlens collect`. Storage is idempotent, so
//! collecting the same app repeatedly only ever adds reviews that were not
//! stored yet.

use serde::Serialize;

use crate::config::Config;
use crate::error::{Result, ReviewError};
use crate::fetch::Fetcher;
use crate::models::{AppKey, SourceKind, SourceMode};
use crate::store::ReviewStore;

/// Largest sample a single collect may request.
pub const MAX_HOW_MANY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct CollectOutcome {
    /// Source that produced the sample.
    pub source: SourceKind,
    /// Reviews in the sample.
    pub fetched: usize,
    /// Reviews that were new to the store.
    pub inserted: u64,
    /// Upstream records dropped while cleaning.
    pub dropped: usize,
    /// Reviews stored for the app after this run.
    pub stored: i64,
}

pub fn validate_how_many(how_many: usize) -> Result<usize> {
    if how_many == 0 || how_many > MAX_HOW_MANY {
        return Err(ReviewError::validation(
            "how_many",
            format!("must be between 1 and {}, got {}", MAX_HOW_MANY, how_many),
        ));
    }
    Ok(how_many)
}

pub async fn collect(
    store: &ReviewStore,
    fetcher: &Fetcher,
    key: &AppKey,
    how_many: usize,
) -> Result<CollectOutcome> {
    let how_many = validate_how_many(how_many)?;
    let outcome = fetcher.fetch(key, how_many).await?;
    let inserted = store.upsert(&outcome.reviews).await?;
    let stored = store.count(key).await?;

    tracing::info!(
        app = %key,
        source = %outcome.source,
        fetched = outcome.reviews.len(),
        inserted,
        stored,
        "collect finished"
    );

    Ok(CollectOutcome {
        source: outcome.source,
        fetched: outcome.reviews.len(),
        inserted,
        dropped: outcome.dropped,
        stored,
    })
}

/// `rlens collect`: runs one collection and prints the outcome.
pub async fn run_collect(
    config: &Config,
    app_id: &str,
    country: &str,
    how_many: usize,
    source: &str,
) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let mode: SourceMode = source.parse()?;
    let fetcher = Fetcher::from_config(&config.fetch, mode)?;
    let store = ReviewStore::open(&config.db).await?;

    let result = collect(&store, &fetcher, &key, how_many).await;
    store.close().await;
    let outcome = result?;

    println!("collect {} ({})", key, outcome.source);
    println!("  fetched:  {}", outcome.fetched);
    println!("  inserted: {}", outcome.inserted);
    println!("  dropped:  {}", outcome.dropped);
    println!("  stored:   {}", outcome.stored);
    println!("ok");

    Ok(())
}
