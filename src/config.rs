//! TOML configuration.
//!
//! Every section has defaults, so a config file only needs the keys it wants
//! to change. An empty file is a valid configuration.
//!
//! ```toml
//! [db]
//! path = "./data/reviews.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [fetch]
//! pool_factor = 5
//! rss_max_pages = 10
//!
//! [sentiment]
//! provider = "lexicon"   # or "http"
//!
//! [insights]
//! top_keywords = 10
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/reviews.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Upstream review sources.
///
/// The three URL templates accept `{country}`, `{app_id}`, `{page}` and
/// `{offset}` placeholders.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    /// Pool size is `how_many * pool_factor`, bounded by the page limits.
    pub pool_factor: usize,
    pub rss_max_pages: u32,
    pub scraper_max_pages: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub rss_url: String,
    pub store_page_url: String,
    pub reviews_api_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pool_factor: 5,
            rss_max_pages: 10,
            scraper_max_pages: 25,
            timeout_secs: 15,
            user_agent: format!("review-lens/{}", env!("CARGO_PKG_VERSION")),
            rss_url: "https://itunes.apple.com/{country}/rss/customerreviews/page={page}/id={app_id}/sortby=mostrecent/json".to_string(),
            store_page_url: "https://apps.apple.com/{country}/app/id{app_id}".to_string(),
            reviews_api_url: "https://amp-api-edge.apps.apple.com/v1/catalog/{country}/apps/{app_id}/reviews?l=en-US&offset={offset}&limit=20&platform=web&additionalPlatforms=appletv,ipad,iphone,mac".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SentimentConfig {
    /// `lexicon` (built-in) or `http` (hosted inference endpoint).
    pub provider: String,
    pub model: String,
    /// Inference endpoint. Defaults to the hosted inference API for `model`.
    pub endpoint: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            provider: "lexicon".to_string(),
            model: "cardiffnlp/twitter-roberta-base-sentiment-latest".to_string(),
            endpoint: None,
            batch_size: 16,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl SentimentConfig {
    pub fn endpoint_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://api-inference.huggingface.co/models/{}",
                self.model
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InsightsConfig {
    pub top_keywords: usize,
    /// Words ignored by keyword extraction on top of the built-in list.
    pub extra_stop_words: Vec<String>,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            top_keywords: 10,
            extra_stop_words: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RLENS_DB_PATH") {
            self.db.path = PathBuf::from(path);
        }
        if let Ok(bind) = std::env::var("RLENS_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.pool_factor == 0 {
            anyhow::bail!("fetch.pool_factor must be >= 1");
        }
        if self.fetch.rss_max_pages == 0 && self.fetch.scraper_max_pages == 0 {
            anyhow::bail!(
                "at least one of fetch.rss_max_pages / fetch.scraper_max_pages must be > 0"
            );
        }
        if self.sentiment.batch_size == 0 {
            anyhow::bail!("sentiment.batch_size must be > 0");
        }
        if self.insights.top_keywords == 0 {
            anyhow::bail!("insights.top_keywords must be > 0");
        }

        match self.sentiment.provider.as_str() {
            "lexicon" | "http" => {}
            other => anyhow::bail!(
                "Unknown sentiment provider: '{}'. Must be lexicon or http.",
                other
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.fetch.pool_factor, 5);
        assert_eq!(config.insights.top_keywords, 10);
        assert_eq!(config.sentiment.provider, "lexicon");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[fetch]
rss_max_pages = 3

[insights]
top_keywords = 5
"#,
        )
        .unwrap();
        assert_eq!(config.fetch.rss_max_pages, 3);
        assert_eq!(config.fetch.scraper_max_pages, 25);
        assert_eq!(config.insights.top_keywords, 5);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config = toml::from_str("[sentiment]\nprovider = \"magic\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown sentiment provider"));
    }

    #[test]
    fn test_default_endpoint_uses_model() {
        let cfg = SentimentConfig::default();
        assert!(cfg
            .endpoint_url()
            .ends_with("/models/cardiffnlp/twitter-roberta-base-sentiment-latest"));
    }
}
