//! iTunes customer-reviews RSS feed (JSON flavour).
//!
//! The feed serves at most 10 pages of up to 50 entries, newest first. On
//! the first page the leading entry may describe the app itself; entries
//! without `im:rating` are skipped.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{expand_url, FetchQuery, ReviewFeed};
use crate::config::FetchConfig;
use crate::models::{RawReview, SourceKind};

/// Apple's hard limit on feed pages.
const MAX_FEED_PAGES: u32 = 10;

pub struct RssFeed {
    client: reqwest::Client,
    url_template: String,
    max_pages: u32,
}

impl RssFeed {
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            url_template: config.rss_url.clone(),
            max_pages: config.rss_max_pages.min(MAX_FEED_PAGES),
        }
    }
}

#[async_trait]
impl ReviewFeed for RssFeed {
    fn kind(&self) -> SourceKind {
        SourceKind::Rss
    }

    async fn fetch_pool(&self, query: &FetchQuery) -> Result<Vec<RawReview>> {
        let mut out = Vec::new();

        for page in 1..=self.max_pages {
            let url = expand_url(&self.url_template, &query.key, page, 0);

            let resp = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) if out.is_empty() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(page, error = %e, "rss paging stopped");
                    break;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                if out.is_empty() {
                    if status.as_u16() == 429 {
                        bail!("rate limited (HTTP 429)");
                    }
                    bail!("HTTP {} from feed", status);
                }
                tracing::debug!(page, %status, "rss paging stopped");
                break;
            }

            let json: Value = match resp.json().await {
                Ok(json) => json,
                Err(e) if out.is_empty() => bail!("unreadable feed: {}", e),
                Err(e) => {
                    tracing::debug!(page, error = %e, "rss paging stopped");
                    break;
                }
            };

            let entries = parse_feed(&json);
            if entries.is_empty() {
                break;
            }
            out.extend(entries);

            if out.len() >= query.pool_target {
                break;
            }
        }

        Ok(out)
    }
}

/// Extracts review entries from one feed page.
pub fn parse_feed(json: &Value) -> Vec<RawReview> {
    let entries = match &json["feed"]["entry"] {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        single @ Value::Object(_) => vec![single],
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .filter(|e| e.get("im:rating").is_some())
        .map(|e| RawReview {
            review_id: label(&e["id"]),
            author: label(&e["author"]["name"]),
            title: label(&e["title"]),
            body: label(&e["content"]),
            rating: label(&e["im:rating"]).and_then(|r| r.trim().parse::<f64>().ok()),
            version: label(&e["im:version"]),
            submitted_at: label(&e["updated"]),
        })
        .collect()
}

/// Feed values are wrapped as `{"label": "..."}`.
fn label(v: &Value) -> Option<String> {
    v.get("label")
        .and_then(|l| l.as_str())
        .or_else(|| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_feed_skips_app_entry() {
        let page = json!({
            "feed": {
                "entry": [
                    { "im:name": { "label": "Some App" }, "id": { "label": "app" } },
                    {
                        "id": { "label": "10001" },
                        "author": { "name": { "label": "Jane" } },
                        "title": { "label": "Nice" },
                        "content": { "label": "Works well", "attributes": { "type": "text" } },
                        "im:rating": { "label": "5" },
                        "im:version": { "label": "2.1" },
                        "updated": { "label": "2024-05-01T10:20:30-07:00" }
                    }
                ]
            }
        });

        let reviews = parse_feed(&page);
        assert_eq!(reviews.len(), 1);
        let r = &reviews[0];
        assert_eq!(r.review_id.as_deref(), Some("10001"));
        assert_eq!(r.author.as_deref(), Some("Jane"));
        assert_eq!(r.body.as_deref(), Some("Works well"));
        assert_eq!(r.rating, Some(5.0));
        assert_eq!(r.version.as_deref(), Some("2.1"));
    }

    #[test]
    fn test_parse_feed_single_object_entry() {
        let page = json!({
            "feed": { "entry": { "id": { "label": "1" }, "im:rating": { "label": "2" } } }
        });
        assert_eq!(parse_feed(&page).len(), 1);
    }

    #[test]
    fn test_parse_feed_without_entries() {
        assert!(parse_feed(&json!({ "feed": {} })).is_empty());
        assert!(parse_feed(&json!([])).is_empty());
    }

    #[test]
    fn test_unparsable_rating_is_none() {
        let page = json!({
            "feed": { "entry": [{ "id": { "label": "1" }, "im:rating": { "label": "five" } }] }
        });
        assert_eq!(parse_feed(&page)[0].rating, None);
    }
}
