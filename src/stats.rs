//! Database statistics overview.
//!
//! Summarises what has been collected: total reviews, and per app/country
//! review counts, mean rating and when it was last collected. Used by
//! `rlens stats`.

use anyhow::Result;

use crate::config::Config;
use crate::store::ReviewStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = ReviewStore::open(&config.db).await?;
    let summaries = store.summaries().await?;
    store.close().await;

    let total: i64 = summaries.iter().map(|s| s.reviews).sum();
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Review Lens — Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Apps:        {}", summaries.len());
    println!("  Reviews:     {}", total);

    if !summaries.is_empty() {
        println!();
        println!("  By app:");
        println!(
            "  {:<14} {:<8} {:>8} {:>8}   {}",
            "APP", "COUNTRY", "REVIEWS", "AVG", "LAST COLLECT"
        );
        println!("  {}", "-".repeat(64));

        for s in &summaries {
            println!(
                "  {:<14} {:<8} {:>8} {:>8.2}   {}",
                s.app_id,
                s.country,
                s.reviews,
                s.average_rating,
                format_ts_relative(s.last_collected_at)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    format_ts_relative_to(ts, chrono::Utc::now().timestamp())
}

fn format_ts_relative_to(ts: i64, now: i64) -> String {
    let delta = now - ts;

    if delta < 0 || delta >= 86400 * 30 {
        return chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string());
    }

    let (n, unit) = match delta {
        0..=59 => return "just now".to_string(),
        60..=3599 => (delta / 60, "min"),
        3600..=86399 => (delta / 3600, "hour"),
        _ => (delta / 86400, "day"),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}
