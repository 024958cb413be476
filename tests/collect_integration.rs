//! End-to-end collection against a local mock of the upstream review
//! sources, driven through the HTTP router.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use review_lens::config::Config;
use review_lens::fetch::Fetcher;
use review_lens::models::{AppKey, Review, SourceKind, SourceMode};
use review_lens::server::{build_router, AppState};
use review_lens::store::ReviewStore;

const TOKEN: &str = "test-bearer-token";

// ============ Mock upstream ============

struct Upstream {
    /// Reviews available from the RSS feed (50 per page, 10 pages max).
    rss_total: usize,
    /// Status of the store page; anything but 200 fails the scraper.
    store_status: u16,
    /// Reviews available from the reviews API (20 per page).
    api_total: usize,
    /// Pages starting at or after this record index come back as an HTML
    /// maintenance page with status 200.
    garbled_from: usize,
    rss_hits: AtomicUsize,
    api_hits: AtomicUsize,
}

fn body_for(n: usize) -> (&'static str, &'static str) {
    match n % 4 {
        0 => ("Love it", "Great playlists and smooth playback"),
        1 => ("Crashes", "Keeps crashing after the update, terrible"),
        2 => ("Fine", "Does the job"),
        _ => ("Ads", "Too many ads, awful experience"),
    }
}

fn maintenance_page() -> Response {
    Html("<html>maintenance</html>").into_response()
}

async fn rss_page(
    State(up): State<Arc<Upstream>>,
    Path((_country, app_id, page)): Path<(String, String, usize)>,
) -> Response {
    up.rss_hits.fetch_add(1, Ordering::SeqCst);

    let start = (page - 1) * 50;
    if start >= up.garbled_from {
        return maintenance_page();
    }
    let end = (start + 50).min(up.rss_total);
    let mut entries: Vec<Value> = Vec::new();
    if page == 1 {
        // The feed leads with an entry describing the app itself.
        entries.push(json!({ "im:name": { "label": "Mock App" }, "id": { "label": app_id } }));
    }
    for n in start..end {
        let (title, body) = body_for(n);
        entries.push(json!({
            "id": { "label": format!("rss-{}", n) },
            "author": { "name": { "label": format!("user{}", n) } },
            "title": { "label": title },
            "content": { "label": body, "attributes": { "type": "text" } },
            "im:rating": { "label": ((n % 5) + 1).to_string() },
            "im:version": { "label": "3.2.1" },
            "updated": { "label": format!("2024-05-{:02}T10:00:00-07:00", n % 28 + 1) }
        }));
    }
    Json(json!({ "feed": { "entry": entries } })).into_response()
}

async fn store_page(State(up): State<Arc<Upstream>>) -> Response {
    if up.store_status != 200 {
        return StatusCode::from_u16(up.store_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }
    let env = json!({ "MEDIA_API": { "token": TOKEN } }).to_string();
    Html(format!(
        r#"<html><head><meta name="web-experience-app/config/environment" content="{}"></head></html>"#,
        urlencoding::encode(&env)
    ))
    .into_response()
}

async fn reviews_api(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    up.api_hits.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let offset: usize = params.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
    if offset >= up.garbled_from {
        return maintenance_page();
    }
    let end = (offset + 20).min(up.api_total);
    let data: Vec<Value> = (offset..end)
        .map(|n| {
            let (title, body) = body_for(n);
            json!({
                "id": format!("web-{}", n),
                "type": "user-reviews",
                "attributes": {
                    "userName": format!("user{}", n),
                    "title": title,
                    "review": body,
                    "rating": (n % 5) + 1,
                    "date": "2024-06-01T08:00:00Z"
                }
            })
        })
        .collect();

    let mut page = json!({ "data": data });
    if end < up.api_total {
        page["next"] = json!(format!("/v1/reviews?offset={}", end));
    }
    Json(page).into_response()
}

async fn spawn_upstream(up: Arc<Upstream>) -> SocketAddr {
    let app = Router::new()
        .route("/rss/{country}/{app_id}/{page}", get(rss_page))
        .route("/store/{country}/{app_id}", get(store_page))
        .route("/api/{country}/{app_id}", get(reviews_api))
        .with_state(up);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn upstream(rss_total: usize, store_status: u16, api_total: usize) -> Arc<Upstream> {
    upstream_garbled_from(rss_total, store_status, api_total, usize::MAX)
}

fn upstream_garbled_from(
    rss_total: usize,
    store_status: u16,
    api_total: usize,
    garbled_from: usize,
) -> Arc<Upstream> {
    Arc::new(Upstream {
        rss_total,
        store_status,
        api_total,
        garbled_from,
        rss_hits: AtomicUsize::new(0),
        api_hits: AtomicUsize::new(0),
    })
}

fn test_config(tmp: &TempDir, addr: SocketAddr) -> Config {
    let content = format!(
        r#"[db]
path = "{db}"

[fetch]
timeout_secs = 5
rss_url = "http://{addr}/rss/{{country}}/{{app_id}}/{{page}}"
store_page_url = "http://{addr}/store/{{country}}/{{app_id}}"
reviews_api_url = "http://{addr}/api/{{country}}/{{app_id}}?offset={{offset}}"
"#,
        db = tmp.path().join("reviews.sqlite").display(),
        addr = addr,
    );
    toml::from_str(&content).unwrap()
}

async fn setup(up: Arc<Upstream>) -> (TempDir, Config, ReviewStore, Router) {
    let tmp = TempDir::new().unwrap();
    let addr = spawn_upstream(up).await;
    let config = test_config(&tmp, addr);
    let store = ReviewStore::open(&config.db).await.unwrap();
    let app = build_router(AppState::new(store.clone(), config.clone()).unwrap());
    (tmp, config, store, app)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, bytes)
}

async fn post_collect(app: &Router, body: Value) -> (StatusCode, HeaderMap, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/collect")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, headers, bytes) = call(app, request).await;
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

async fn get_bytes(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    call(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

// ============ Tests ============

#[tokio::test]
async fn test_scraper_rate_limited_falls_back_to_rss() {
    let up = upstream(500, 429, 0);
    let (_tmp, _config, store, app) = setup(up.clone()).await;

    let (status, _, body) = post_collect(
        &app,
        json!({ "app_id": "555", "country": "us", "how_many": 100 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["source"], "rss");
    assert_eq!(body["fetched"], 100);
    assert_eq!(body["inserted"], 100);
    assert_eq!(up.api_hits.load(Ordering::SeqCst), 0);

    let key = AppKey::new("555", "us").unwrap();
    assert_eq!(store.count(&key).await.unwrap(), 100);
}

#[tokio::test]
async fn test_sample_of_100_from_pool_of_500_is_unique() {
    let up = upstream(500, 429, 0);
    let (_tmp, config, _store, _app) = setup(up.clone()).await;

    let fetcher = Fetcher::from_config(&config.fetch, SourceMode::Only(SourceKind::Rss)).unwrap();
    let key = AppKey::new("555", "us").unwrap();
    let outcome = fetcher.fetch(&key, 100).await.unwrap();

    assert_eq!(outcome.pool_size, 500);
    assert_eq!(outcome.reviews.len(), 100);
    let ids: BTreeSet<&str> = outcome.reviews.iter().map(|r| r.review_id.as_str()).collect();
    assert_eq!(ids.len(), 100);
    // 10 pages of 50 fill the pool exactly
    assert_eq!(up.rss_hits.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_scraper_success_uses_bearer_token() {
    let up = upstream(0, 200, 45);
    let (_tmp, _config, _store, app) = setup(up.clone()).await;

    let (status, _, body) = post_collect(
        &app,
        json!({ "app_id": "777", "how_many": 10, "source": "scraper" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["source"], "scraper");
    assert_eq!(body["fetched"], 10);
    // 45 reviews at 20 per page, pool target 50
    assert_eq!(up.api_hits.load(Ordering::SeqCst), 3);
    assert_eq!(up.rss_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scraper_keeps_first_page_when_later_page_is_unreadable() {
    // 20 reviews on page 1, then HTML where page 2 should be.
    let up = upstream_garbled_from(0, 200, 100, 20);
    let (_tmp, config, _store, _app) = setup(up.clone()).await;

    let fetcher =
        Fetcher::from_config(&config.fetch, SourceMode::Only(SourceKind::Scraper)).unwrap();
    let key = AppKey::new("777", "us").unwrap();
    let outcome = fetcher.fetch(&key, 10).await.unwrap();

    assert_eq!(outcome.source, SourceKind::Scraper);
    assert_eq!(outcome.pool_size, 20);
    assert_eq!(outcome.reviews.len(), 10);
    assert!(outcome
        .reviews
        .iter()
        .all(|r| r.review_id.starts_with("web-")));
    assert_eq!(up.api_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rss_keeps_first_page_when_later_page_is_unreadable() {
    let up = upstream_garbled_from(500, 429, 0, 50);
    let (_tmp, _config, store, app) = setup(up.clone()).await;

    let (status, _, body) = post_collect(
        &app,
        json!({ "app_id": "555", "how_many": 20, "source": "rss" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["source"], "rss");
    assert_eq!(body["fetched"], 20);
    assert_eq!(up.rss_hits.load(Ordering::SeqCst), 2);
    let key = AppKey::new("555", "us").unwrap();
    assert_eq!(store.count(&key).await.unwrap(), 20);
}

#[tokio::test]
async fn test_unreadable_first_page_is_a_source_failure() {
    let up = upstream_garbled_from(0, 200, 100, 0);
    let (_tmp, config, _store, _app) = setup(up).await;

    let fetcher =
        Fetcher::from_config(&config.fetch, SourceMode::Only(SourceKind::Scraper)).unwrap();
    let key = AppKey::new("777", "us").unwrap();
    let err = fetcher.fetch(&key, 10).await.unwrap_err();
    assert!(err.to_string().contains("unreadable reviews API page"), "{}", err);
}

#[tokio::test]
async fn test_collect_twice_does_not_double() {
    let up = upstream(30, 429, 0);
    let (_tmp, _config, _store, app) = setup(up).await;
    let req = json!({ "app_id": "555", "country": "gb", "how_many": 30, "source": "auto" });

    let (_, _, first) = post_collect(&app, req.clone()).await;
    assert_eq!(first["inserted"], 30);

    let (status, _, second) = post_collect(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["stored"], 30);

    let (_, _, bytes) = get_bytes(&app, "/metrics?app_id=555&country=gb").await;
    let metrics: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(metrics["count"], 30);
    let sum: i64 = metrics["distribution"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_i64().unwrap())
        .sum();
    assert_eq!(sum, 30);
}

#[tokio::test]
async fn test_all_sources_failing_is_503_with_retry_after() {
    let up = upstream(0, 503, 0);
    let (_tmp, _config, _store, app) = setup(up).await;

    let (status, headers, body) = post_collect(&app, json!({ "app_id": "555" })).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "source_unavailable");
    assert!(headers.contains_key("retry-after"));
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("scraper"), "{}", message);
    assert!(message.contains("rss"), "{}", message);
}

#[tokio::test]
async fn test_downloads_carry_same_review_ids() {
    let up = upstream(120, 429, 0);
    let (_tmp, _config, _store, app) = setup(up).await;
    post_collect(&app, json!({ "app_id": "555", "how_many": 40 })).await;

    let (status, headers, json_bytes) =
        get_bytes(&app, "/reviews/download?app_id=555&country=us&format=json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=reviews_555_us.json"
    );
    let reviews: Vec<Review> = serde_json::from_slice(&json_bytes).unwrap();
    let json_ids: BTreeSet<String> = reviews.into_iter().map(|r| r.review_id).collect();

    let (status, headers, csv_bytes) = get_bytes(&app, "/reviews/download?app_id=555").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=reviews_555_us.csv"
    );
    let mut rdr = csv::Reader::from_reader(csv_bytes.as_slice());
    let csv_ids: BTreeSet<String> = rdr
        .records()
        .map(|r| r.unwrap()[2].to_string())
        .collect();

    assert_eq!(json_ids.len(), 40);
    assert_eq!(json_ids, csv_ids);
}

#[tokio::test]
async fn test_insights_and_report_after_collect() {
    let up = upstream(80, 429, 0);
    let (_tmp, _config, _store, app) = setup(up).await;
    post_collect(&app, json!({ "app_id": "555", "how_many": 80 })).await;

    let (status, _, bytes) = get_bytes(&app, "/insights?app_id=555").await;
    assert_eq!(status, StatusCode::OK);
    let insights: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(insights["total_reviews"], 80);
    assert_eq!(insights["sentiment_counts"]["positive"], 20);
    assert_eq!(insights["sentiment_counts"]["negative"], 40);
    assert_eq!(insights["sentiment_counts"]["neutral"], 20);
    let recs = insights["recommendations"].as_array().unwrap();
    assert!(!recs.is_empty());

    let (status, headers, bytes) = get_bytes(&app, "/report?app_id=555").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(bytes).unwrap();
    assert_eq!(html.matches("data:image/png;base64,").count(), 2);
    assert!(html.contains("Total reviews: <b>80</b>"));
}
