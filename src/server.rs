//! HTTP API server.
//!
//! Exposes collection, metrics, insights, review listing/download and the
//! HTML report over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/collect` | Fetch a sample of reviews and store the new ones |
//! | `GET`  | `/metrics` | Mean rating and 1–5 histogram |
//! | `GET`  | `/insights` | Sentiment counts, keywords, recommendations |
//! | `GET`  | `/reviews` | Stored reviews, newest first |
//! | `GET`  | `/reviews/download` | All stored reviews as a CSV or JSON attachment |
//! | `GET`  | `/report` | HTML report with embedded charts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every read endpoint takes `app_id` and `country` (default `us`) as query
//! parameters.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid app_id: must be numeric" } }
//! ```
//!
//! Error codes: `bad_request` (400), `insufficient_data` (422),
//! `source_unavailable` (503, with `Retry-After`), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::collect::{self, CollectOutcome};
use crate::config::Config;
use crate::error::ReviewError;
use crate::fetch::Fetcher;
use crate::insights::{InsightGenerator, InsightSnapshot};
use crate::metrics::{self, MetricsSnapshot};
use crate::models::{AppKey, Review, SourceMode};
use crate::report::{self, Report, ReportFormat};
use crate::store::ReviewStore;

const DEFAULT_COUNTRY: &str = "us";
const DEFAULT_HOW_MANY: usize = 100;
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;
/// Seconds a client should wait before retrying after `source_unavailable`.
const RETRY_AFTER_SECS: u64 = 60;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ReviewStore,
    pub insights: Arc<InsightGenerator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: ReviewStore, config: Config) -> anyhow::Result<Self> {
        let insights = InsightGenerator::from_config(&config)?;
        Ok(Self {
            store,
            insights: Arc::new(insights),
            config: Arc::new(config),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/collect", post(handle_collect))
        .route("/metrics", get(handle_metrics))
        .route("/insights", get(handle_insights))
        .route("/reviews", get(handle_reviews))
        .route("/reviews/download", get(handle_download))
        .route("/report", get(handle_report))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Opens the store, serves until Ctrl+C or SIGTERM, then closes the store.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = ReviewStore::open(&config.db).await?;
    let state = AppState::new(store.clone(), config.clone())?;

    tracing::info!(
        classifier = state.insights.classifier_name(),
        db = %config.db.path.display(),
        "starting server"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Review Lens server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into the JSON error contract.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        retry_after: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
        retry_after: None,
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Validation { .. } => bad_request(err.to_string()),
            ReviewError::InsufficientData { .. } => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "insufficient_data",
                message: err.to_string(),
                retry_after: None,
            },
            ReviewError::SourceUnavailable { .. } => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "source_unavailable",
                message: err.to_string(),
                retry_after: Some(RETRY_AFTER_SECS),
            },
            ReviewError::Storage(_) | ReviewError::Other(_) => {
                tracing::error!(error = %err, "request failed");
                internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        internal(err.to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ Request parameters ============

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

#[derive(Debug, Deserialize)]
pub struct AppParams {
    app_id: String,
    #[serde(default = "default_country")]
    country: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewsParams {
    app_id: String,
    #[serde(default = "default_country")]
    country: String,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FormatParams {
    app_id: String,
    #[serde(default = "default_country")]
    country: String,
    format: Option<String>,
}

fn app_key(app_id: &str, country: &str) -> Result<AppKey, AppError> {
    Ok(AppKey::new(app_id, country)?)
}

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    app_id: String,
    #[serde(default = "default_country")]
    country: String,
    how_many: Option<usize>,
    source: Option<String>,
}

// ============ POST /collect ============

#[derive(Serialize)]
struct CollectResponse {
    status: &'static str,
    #[serde(flatten)]
    outcome: CollectOutcome,
}

async fn handle_collect(
    State(state): State<AppState>,
    body: Result<Json<CollectRequest>, JsonRejection>,
) -> Result<Json<CollectResponse>, AppError> {
    let Json(req) = body?;
    let key = AppKey::new(&req.app_id, &req.country)?;
    let how_many = collect::validate_how_many(req.how_many.unwrap_or(DEFAULT_HOW_MANY))?;
    let mode: SourceMode = req.source.as_deref().unwrap_or("").parse()?;

    let fetcher = Fetcher::from_config(&state.config.fetch, mode)?;
    let outcome = collect::collect(&state.store, &fetcher, &key, how_many).await?;

    Ok(Json(CollectResponse {
        status: "ok",
        outcome,
    }))
}

// ============ GET /metrics, /insights ============

async fn handle_metrics(
    State(state): State<AppState>,
    params: Result<Query<AppParams>, QueryRejection>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    let Query(params) = params?;
    let key = app_key(&params.app_id, &params.country)?;
    Ok(Json(metrics::compute(&state.store, &key).await?))
}

async fn handle_insights(
    State(state): State<AppState>,
    params: Result<Query<AppParams>, QueryRejection>,
) -> Result<Json<InsightSnapshot>, AppError> {
    let Query(params) = params?;
    let key = app_key(&params.app_id, &params.country)?;
    Ok(Json(state.insights.analyze(&state.store, &key).await?))
}

// ============ GET /reviews, /reviews/download ============

async fn handle_reviews(
    State(state): State<AppState>,
    params: Result<Query<ReviewsParams>, QueryRejection>,
) -> Result<Json<Vec<Review>>, AppError> {
    let Query(params) = params?;
    let key = app_key(&params.app_id, &params.country)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(bad_request(format!(
            "invalid limit: must be between 1 and {}, got {}",
            MAX_LIMIT, limit
        )));
    }

    Ok(Json(state.store.query(&key, limit).await?))
}

async fn handle_download(
    State(state): State<AppState>,
    params: Result<Query<FormatParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let key = app_key(&params.app_id, &params.country)?;
    let format: ReportFormat = params.format.as_deref().unwrap_or("csv").parse()?;

    let reviews = state.store.all(&key).await?;
    let bytes = report::render_reviews(format, &reviews)?;
    let disposition = format!(
        "attachment; filename=reviews_{}_{}.{}",
        key.app_id,
        key.country,
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ============ GET /report ============

async fn handle_report(
    State(state): State<AppState>,
    params: Result<Query<FormatParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let key = app_key(&params.app_id, &params.country)?;
    let format: ReportFormat = params.format.as_deref().unwrap_or("html").parse()?;

    let report = Report::build(&state.store, &state.insights, &key).await?;
    let bytes = report::render(format, &report)?;

    if format == ReportFormat::Html {
        let html = String::from_utf8(bytes).map_err(anyhow::Error::from)?;
        return Ok(Html(html).into_response());
    }
    Ok((
        [(header::CONTENT_TYPE, format.content_type().to_string())],
        bytes,
    )
        .into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
