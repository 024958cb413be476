//! Rendering stored reviews and analysis results as JSON, CSV and HTML.
//!
//! Output depends only on the input: no timestamps, no map iteration in
//! hash order. Rendering the same reviews twice gives identical bytes.

use anyhow::Context;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::chart::{bar_chart_png, png_data_uri, RATING_PALETTE, SENTIMENT_PALETTE};
use crate::config::Config;
use crate::error::{Result, ReviewError};
use crate::insights::{InsightGenerator, InsightSnapshot};
use crate::metrics::{self, MetricsSnapshot};
use crate::models::{AppKey, Review};
use crate::sentiment::Sentiment;
use crate::store::ReviewStore;

pub const REVIEW_CSV_HEADER: [&str; 10] = [
    "app_id",
    "country",
    "review_id",
    "author",
    "title",
    "body",
    "rating",
    "version",
    "submitted_at",
    "source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            other => Err(ReviewError::validation(
                "format",
                format!("unknown format '{}' (expected json, csv or html)", other),
            )),
        }
    }
}

/// Serializes reviews as a JSON array or a CSV table. HTML is rejected.
pub fn render_reviews(format: ReportFormat, reviews: &[Review]) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_vec_pretty(reviews).map_err(anyhow::Error::from)?),
        ReportFormat::Csv => reviews_csv(reviews),
        ReportFormat::Html => Err(ReviewError::validation(
            "format",
            "reviews can be downloaded as json or csv",
        )),
    }
}

fn reviews_csv(reviews: &[Review]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let write = |wtr: &mut csv::Writer<Vec<u8>>| -> csv::Result<()> {
        wtr.write_record(REVIEW_CSV_HEADER)?;
        for review in reviews {
            wtr.serialize(review)?;
        }
        wtr.flush()?;
        Ok(())
    };
    write(&mut wtr).map_err(anyhow::Error::from)?;
    wtr.into_inner()
        .map_err(|e| ReviewError::Other(anyhow::anyhow!("Failed to finish CSV: {}", e)))
}

/// Metrics and insights for one app, rendered together.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metrics: MetricsSnapshot,
    pub insights: InsightSnapshot,
}

impl Report {
    /// Fails with [`ReviewError::InsufficientData`] when nothing is stored.
    pub async fn build(
        store: &ReviewStore,
        insights: &InsightGenerator,
        key: &AppKey,
    ) -> Result<Self> {
        let metrics = metrics::compute(store, key).await?;
        if metrics.count == 0 {
            return Err(ReviewError::insufficient_data(&key.app_id, &key.country));
        }
        let insights = insights.analyze(store, key).await?;
        Ok(Self { metrics, insights })
    }
}

pub fn render(format: ReportFormat, report: &Report) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_vec_pretty(report).map_err(anyhow::Error::from)?),
        ReportFormat::Csv => report_csv(report),
        ReportFormat::Html => Ok(report_html(report)?.into_bytes()),
    }
}

/// Long-format table: `section,key,value`.
fn report_csv(report: &Report) -> Result<Vec<u8>> {
    let m = &report.metrics;
    let ins = &report.insights;

    let mut rows: Vec<[String; 3]> = vec![
        ["summary".into(), "count".into(), m.count.to_string()],
        ["summary".into(), "average_rating".into(), format!("{:.2}", m.average_rating)],
    ];
    for (star, n) in &m.distribution {
        rows.push(["rating".into(), star.to_string(), n.to_string()]);
    }
    for (label, n) in &ins.sentiment_counts {
        rows.push(["sentiment".into(), label.to_string(), n.to_string()]);
    }
    for (i, word) in ins.top_keywords.iter().enumerate() {
        rows.push(["keyword".into(), (i + 1).to_string(), word.clone()]);
    }
    for (i, word) in ins.top_negative_keywords.iter().enumerate() {
        rows.push(["negative_keyword".into(), (i + 1).to_string(), word.clone()]);
    }
    for (i, rec) in ins.recommendations.iter().enumerate() {
        rows.push(["recommendation".into(), (i + 1).to_string(), rec.clone()]);
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    let write = |wtr: &mut csv::Writer<Vec<u8>>| -> csv::Result<()> {
        wtr.write_record(["section", "key", "value"])?;
        for row in &rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    };
    write(&mut wtr).map_err(anyhow::Error::from)?;
    wtr.into_inner()
        .map_err(|e| ReviewError::Other(anyhow::anyhow!("Failed to finish CSV: {}", e)))
}

fn report_html(report: &Report) -> anyhow::Result<String> {
    let m = &report.metrics;
    let ins = &report.insights;

    let rating_values: Vec<f64> = m.distribution_percent.values().copied().collect();
    let rating_chart = png_data_uri(&bar_chart_png(&rating_values, RATING_PALETTE)?);

    let labels = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];
    let sentiment_values: Vec<f64> = labels
        .iter()
        .map(|l| ins.sentiment_percent.get(l).copied().unwrap_or(0.0))
        .collect();
    let sentiment_chart = png_data_uri(&bar_chart_png(&sentiment_values, SENTIMENT_PALETTE)?);

    let app = escape(&m.app_id);
    let country = escape(&m.country.to_uppercase());

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>Review report for {} ({})</title>\n", app, country));
    html.push_str(
        "<style>body{font-family:Arial,Helvetica,sans-serif;margin:24px}\
         .grid{display:grid;grid-template-columns:1fr 1fr;gap:24px}\
         td,th{padding:2px 10px;text-align:left}</style>\n",
    );
    html.push_str("</head><body>\n");
    html.push_str(&format!("<h1>App {} / {}</h1>\n", app, country));

    html.push_str("<h2>Metrics</h2>\n<ul>\n");
    html.push_str(&format!("<li>Total reviews: <b>{}</b></li>\n", m.count));
    html.push_str(&format!("<li>Average rating: <b>{:.2}</b></li>\n", m.average_rating));
    html.push_str(&format!(
        "<li>Classified: <b>{}</b> (skipped {})</li>\n",
        ins.classified, ins.skipped
    ));
    html.push_str("</ul>\n");

    html.push_str("<div class=\"grid\">\n");
    html.push_str("<div><h3>Ratings (%)</h3>\n");
    html.push_str(&format!("<img alt=\"Rating distribution\" src=\"{}\">\n", rating_chart));
    html.push_str("<table><tr><th>Stars</th><th>Reviews</th><th>%</th></tr>\n");
    for (star, n) in &m.distribution {
        let pct = m.distribution_percent.get(star).copied().unwrap_or(0.0);
        html.push_str(&format!("<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n", star, n, pct));
    }
    html.push_str("</table></div>\n");

    html.push_str("<div><h3>Sentiment (%)</h3>\n");
    html.push_str(&format!(
        "<img alt=\"Sentiment distribution\" src=\"{}\">\n",
        sentiment_chart
    ));
    html.push_str("<table><tr><th>Sentiment</th><th>Reviews</th><th>%</th></tr>\n");
    for (label, pct) in labels.iter().zip(&sentiment_values) {
        let n = ins.sentiment_counts.get(label).copied().unwrap_or(0);
        html.push_str(&format!("<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n", label, n, pct));
    }
    html.push_str("</table></div>\n</div>\n");

    html.push_str("<h2>Top Keywords</h2>\n");
    html.push_str(&format!("<p>{}</p>\n", keyword_list(&ins.top_keywords)));
    html.push_str("<h2>Top Negative Keywords</h2>\n");
    html.push_str(&format!("<p>{}</p>\n", keyword_list(&ins.top_negative_keywords)));

    html.push_str("<h2>Recommendations</h2>\n");
    if ins.recommendations.is_empty() {
        html.push_str("<p>None</p>\n");
    } else {
        html.push_str("<ul>\n");
        for rec in &ins.recommendations {
            html.push_str(&format!("<li>{}</li>\n", escape(rec)));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body></html>\n");
    Ok(html)
}

fn keyword_list(words: &[String]) -> String {
    if words.is_empty() {
        return "None".to_string();
    }
    words.iter().map(|w| escape(w)).collect::<Vec<_>>().join(", ")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============ CLI ============

/// `rlens reviews`: prints the newest stored reviews.
pub async fn run_reviews(
    config: &Config,
    app_id: &str,
    country: &str,
    limit: i64,
) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let store = ReviewStore::open(&config.db).await?;
    let reviews = store.query(&key, limit).await;
    store.close().await;
    let reviews = reviews?;

    if reviews.is_empty() {
        println!("No reviews stored for {}.", key);
        return Ok(());
    }

    for r in &reviews {
        let date = r
            .submitted_at
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<5}  {:<10}  {}",
            "★".repeat(r.rating.clamp(0, 5) as usize),
            date,
            r.title.as_deref().unwrap_or("(untitled)")
        );
        if !r.body.is_empty() {
            println!("    {}", truncate(&r.body, 160));
        }
    }
    println!();
    println!("{} review(s) shown", reviews.len());

    Ok(())
}

/// `rlens download`: writes all stored reviews to a file.
pub async fn run_download(
    config: &Config,
    app_id: &str,
    country: &str,
    format: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let format: ReportFormat = format.parse()?;
    let store = ReviewStore::open(&config.db).await?;
    let reviews = store.all(&key).await;
    store.close().await;
    let reviews = reviews?;

    let bytes = render_reviews(format, &reviews)?;
    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "reviews_{}_{}.{}",
            key.app_id,
            key.country,
            format.extension()
        ))
    });
    write_output(&path, &bytes)?;

    println!("Wrote {} review(s) to {}", reviews.len(), path.display());
    Ok(())
}

/// `rlens report`: renders the report to a file.
pub async fn run_report(
    config: &Config,
    app_id: &str,
    country: &str,
    format: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let key = AppKey::new(app_id, country)?;
    let format: ReportFormat = format.parse()?;
    let generator = InsightGenerator::from_config(config)?;
    let store = ReviewStore::open(&config.db).await?;
    let report = Report::build(&store, &generator, &key).await;
    store.close().await;
    let report = report?;

    let bytes = render(format, &report)?;
    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "report_{}_{}.{}",
            key.app_id,
            key.country,
            format.extension()
        ))
    });
    write_output(&path, &bytes)?;

    println!("Wrote {} report to {}", format, path.display());
    Ok(())
}

/// Writes through a sibling temp file and renames, so readers never see a
/// partial file.
fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
