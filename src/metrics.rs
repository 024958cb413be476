//! Rating metrics: mean rating and the 1–5 star histogram.
//!
//! With no stored reviews the snapshot has `count = 0`, `average_rating =
//! 0.0`, and a histogram of five zeros. It is never an error.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Result;
use crate::models::AppKey;
use crate::store::ReviewStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub app_id: String,
    pub country: String,
    pub count: i64,
    /// Mean star rating rounded to two decimals; `0.0` when `count == 0`.
    pub average_rating: f64,
    /// Star value → number of reviews. Always has keys 1 through 5.
    pub distribution: BTreeMap<u8, i64>,
    /// Star value → percent of reviews, two decimals.
    pub distribution_percent: BTreeMap<u8, f64>,
}

impl MetricsSnapshot {
    /// Builds a snapshot from `(rating, count)` pairs. Ratings outside 1–5
    /// are ignored.
    pub fn from_counts(key: &AppKey, counts: &[(i64, i64)]) -> Self {
        let mut distribution: BTreeMap<u8, i64> = (1..=5).map(|star| (star, 0)).collect();
        for &(rating, n) in counts {
            if (1..=5).contains(&rating) {
                *distribution.entry(rating as u8).or_insert(0) += n;
            }
        }

        let count: i64 = distribution.values().sum();
        let total_stars: i64 = distribution
            .iter()
            .map(|(star, n)| i64::from(*star) * n)
            .sum();

        let average_rating = if count == 0 {
            0.0
        } else {
            round2(total_stars as f64 / count as f64)
        };

        let distribution_percent = distribution
            .iter()
            .map(|(star, n)| (*star, percent(*n, count)))
            .collect();

        Self {
            app_id: key.app_id.clone(),
            country: key.country.clone(),
            count,
            average_rating,
            distribution,
            distribution_percent,
        }
    }
}

/// Recomputes the snapshot from the rows currently stored for `key`.
pub async fn compute(store: &ReviewStore, key: &AppKey) -> Result<MetricsSnapshot> {
    let counts = store.rating_counts(key).await?;
    Ok(MetricsSnapshot::from_counts(key, &counts))
}

/// `rlens metrics`: prints the snapshot as a small table.
pub async fn run_metrics(config: &Config, app_id: &str, country: &str) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let store = ReviewStore::open(&config.db).await?;
    let m = compute(&store, &key).await;
    store.close().await;
    let m = m?;

    println!("metrics {}", key);
    println!("  reviews:        {}", m.count);
    println!("  average rating: {:.2}", m.average_rating);
    println!();
    for (star, n) in m.distribution.iter().rev() {
        let pct = m.distribution_percent.get(star).copied().unwrap_or(0.0);
        println!("  {} star  {:>6}  {:>6.2}%", star, n, pct);
    }

    Ok(())
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn percent(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / total as f64)
    }
}
