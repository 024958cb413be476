//! App Store web scraper.
//!
//! Loads the public store page for the app, pulls the web player's media
//! API bearer token out of it, then pages through the catalog reviews API
//! (20 reviews per page) with that token.
//!
//! The token lives in the page's `web-experience-app/config/environment`
//! meta tag as URL-encoded JSON (`MEDIA_API.token`).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::{expand_url, FetchQuery, ReviewFeed};
use crate::config::FetchConfig;
use crate::models::{RawReview, SourceKind};

static ENCODED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)token%22%3A%22([^%"]+)%22"#).unwrap());
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+name="web-experience-app/config/environment"\s+content="([^"]+)""#)
        .unwrap()
});

pub struct ScraperFeed {
    client: reqwest::Client,
    page_template: String,
    api_template: String,
    max_pages: u32,
}

impl ScraperFeed {
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            page_template: config.store_page_url.clone(),
            api_template: config.reviews_api_url.clone(),
            max_pages: config.scraper_max_pages,
        }
    }

    async fn fetch_token(&self, query: &FetchQuery) -> Result<String> {
        let url = expand_url(&self.page_template, &query.key, 1, 0);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            bail!("rate limited (HTTP 429) on store page");
        }
        if !status.is_success() {
            bail!("HTTP {} from store page", status);
        }
        let html = resp.text().await?;
        extract_token(&html).ok_or_else(|| anyhow!("no media API token on store page"))
    }
}

#[async_trait]
impl ReviewFeed for ScraperFeed {
    fn kind(&self) -> SourceKind {
        SourceKind::Scraper
    }

    async fn fetch_pool(&self, query: &FetchQuery) -> Result<Vec<RawReview>> {
        if self.max_pages == 0 {
            bail!("scraper disabled (fetch.scraper_max_pages = 0)");
        }

        let token = self.fetch_token(query).await?;
        let mut out = Vec::new();
        let mut offset = 0usize;

        for page in 1..=self.max_pages {
            let url = expand_url(&self.api_template, &query.key, page, offset);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .header("Origin", "https://apps.apple.com")
                .send()
                .await;

            let resp = match resp {
                Ok(resp) => resp,
                Err(e) if out.is_empty() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(page, error = %e, "scraper paging stopped");
                    break;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                if out.is_empty() {
                    if status.as_u16() == 429 {
                        bail!("rate limited (HTTP 429)");
                    }
                    bail!("HTTP {} from reviews API", status);
                }
                tracing::debug!(page, %status, "scraper paging stopped");
                break;
            }

            let json: Value = match resp.json().await {
                Ok(json) => json,
                Err(e) if out.is_empty() => bail!("unreadable reviews API page: {}", e),
                Err(e) => {
                    tracing::debug!(page, error = %e, "scraper paging stopped");
                    break;
                }
            };
            let batch = parse_reviews_page(&json);
            if batch.is_empty() {
                break;
            }
            offset += batch.len();
            out.extend(batch);

            let has_next = json.get("next").and_then(|n| n.as_str()).is_some();
            if !has_next || out.len() >= query.pool_target {
                break;
            }
        }

        Ok(out)
    }
}

/// Finds the media API bearer token in a store page.
pub fn extract_token(html: &str) -> Option<String> {
    let from_meta = META_RE
        .captures(html)
        .and_then(|caps| urlencoding::decode(&caps[1]).ok().map(|d| d.into_owned()))
        .and_then(|decoded| serde_json::from_str::<Value>(&decoded).ok())
        .and_then(|env| env["MEDIA_API"]["token"].as_str().map(|t| t.to_string()));

    // Older pages inline the same config elsewhere, still URL-encoded.
    from_meta.or_else(|| {
        ENCODED_TOKEN_RE
            .captures(html)
            .map(|caps| caps[1].to_string())
    })
}

/// Extracts reviews from one reviews-API page (`data[].attributes`).
pub fn parse_reviews_page(json: &Value) -> Vec<RawReview> {
    let Some(data) = json.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    data.iter()
        .map(|item| {
            let attrs = &item["attributes"];
            RawReview {
                review_id: item["id"]
                    .as_str()
                    .map(|s| s.to_string())
                    .or_else(|| item["id"].as_i64().map(|n| n.to_string())),
                author: attrs["userName"].as_str().map(|s| s.to_string()),
                title: attrs["title"].as_str().map(|s| s.to_string()),
                body: attrs["review"].as_str().map(|s| s.to_string()),
                rating: attrs["rating"].as_f64(),
                version: None,
                submitted_at: attrs["date"].as_str().map(|s| s.to_string()),
            }
        })
        .collect()
}
