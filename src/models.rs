//! Core data models used throughout Review Lens.
//!
//! Raw records come out of a source as [`RawReview`], get cleaned into a
//! [`Review`], and are stored keyed by `(app_id, country, review_id)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ReviewError};

/// Validated `(app_id, country)` pair identifying one storefront review set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppKey {
    pub app_id: String,
    pub country: String,
}

impl AppKey {
    /// Validates an App Store numeric id and a 2-letter storefront code.
    /// The country is normalized to lowercase.
    pub fn new(app_id: &str, country: &str) -> Result<Self> {
        let app_id = app_id.trim();
        if app_id.is_empty() || app_id.len() > 20 || !app_id.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ReviewError::validation(
                "app_id",
                format!("'{}' is not a numeric App Store id", app_id),
            ));
        }

        let country = country.trim().to_ascii_lowercase();
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(ReviewError::validation(
                "country",
                format!("'{}' is not a 2-letter storefront code", country),
            ));
        }

        Ok(Self {
            app_id: app_id.to_string(),
            country,
        })
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.country)
    }
}

/// Upstream a review was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Scraper,
    Rss,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraper => "scraper",
            Self::Rss => "rss",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scraper" | "webscraper" => Ok(Self::Scraper),
            "rss" => Ok(Self::Rss),
            other => Err(ReviewError::validation(
                "source",
                format!("unknown source '{}'", other),
            )),
        }
    }
}

/// Which sources `collect` may use, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Scraper first, RSS on failure.
    #[default]
    Auto,
    Only(SourceKind),
}

impl SourceMode {
    /// Ordered strategy list for this mode.
    pub fn strategies(&self) -> Vec<SourceKind> {
        match self {
            Self::Auto => vec![SourceKind::Scraper, SourceKind::Rss],
            Self::Only(kind) => vec![*kind],
        }
    }
}

impl FromStr for SourceMode {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            other => other.parse().map(Self::Only),
        }
    }
}

/// A record as produced by a source, before cleaning.
#[derive(Debug, Clone, Default)]
pub struct RawReview {
    pub review_id: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<f64>,
    pub version: Option<String>,
    /// RFC 3339 timestamp as published upstream.
    pub submitted_at: Option<String>,
}

/// A cleaned, storable review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub app_id: String,
    pub country: String,
    pub review_id: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub rating: i64,
    pub version: Option<String>,
    /// Unix seconds; `None` when upstream did not publish a usable date.
    pub submitted_at: Option<i64>,
    pub source: SourceKind,
}
