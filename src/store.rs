//! Review persistence.
//!
//! [`ReviewStore`] is the only handle to the database. It is opened once
//! (creating the file and running migrations), cloned into whatever needs
//! it, and closed at shutdown.
//!
//! Reviews are unique on `(app_id, country, review_id)`. Inserting a review
//! that already exists is a no-op, so collecting the same app twice never
//! duplicates rows and never rewrites what was stored first.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::DbConfig;
use crate::db;
use crate::error::Result;
use crate::migrate;
use crate::models::{AppKey, Review, SourceKind};

const REVIEW_COLUMNS: &str =
    "app_id, country, review_id, author, title, body, rating, version, submitted_at, source";

/// Newest first; undated reviews after dated ones, oldest insert first.
const REVIEW_ORDER: &str = "ORDER BY submitted_at IS NULL, submitted_at DESC, id ASC";

/// Per-app row counts, used by `rlens stats`.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub app_id: String,
    pub country: String,
    pub reviews: i64,
    pub average_rating: f64,
    pub last_collected_at: i64,
}

#[derive(Clone)]
pub struct ReviewStore {
    pool: SqlitePool,
}

impl ReviewStore {
    /// Connects and brings the schema up to date.
    pub async fn open(config: &DbConfig) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts reviews in one transaction, skipping existing keys.
    /// Returns the number of rows actually inserted.
    pub async fn upsert(&self, reviews: &[Review]) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for r in reviews {
            let result = sqlx::query(
                r#"
                INSERT INTO reviews (app_id, country, review_id, author, title, body, rating, version, submitted_at, source, collected_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(app_id, country, review_id) DO NOTHING
                "#,
            )
            .bind(&r.app_id)
            .bind(&r.country)
            .bind(&r.review_id)
            .bind(&r.author)
            .bind(&r.title)
            .bind(&r.body)
            .bind(r.rating)
            .bind(&r.version)
            .bind(r.submitted_at)
            .bind(r.source.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Up to `limit` reviews for `key`, newest first. Unknown keys yield an
    /// empty vector.
    pub async fn query(&self, key: &AppKey, limit: i64) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE app_id = ? AND country = ? {} LIMIT ?",
            REVIEW_COLUMNS, REVIEW_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind(&key.app_id)
            .bind(&key.country)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_review).collect()
    }

    /// Every stored review for `key`, in the same order as [`query`](Self::query).
    pub async fn all(&self, key: &AppKey) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE app_id = ? AND country = ? {}",
            REVIEW_COLUMNS, REVIEW_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind(&key.app_id)
            .bind(&key.country)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_review).collect()
    }

    pub async fn count(&self, key: &AppKey) -> Result<i64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE app_id = ? AND country = ?")
                .bind(&key.app_id)
                .bind(&key.country)
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }

    /// `(rating, count)` pairs for the ratings present.
    pub async fn rating_counts(&self, key: &AppKey) -> Result<Vec<(i64, i64)>> {
        let rows = sqlx::query(
            "SELECT rating, COUNT(*) AS n FROM reviews WHERE app_id = ? AND country = ? GROUP BY rating ORDER BY rating",
        )
        .bind(&key.app_id)
        .bind(&key.country)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("rating"), row.get::<i64, _>("n")))
            .collect())
    }

    pub async fn summaries(&self) -> Result<Vec<StoreSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT app_id, country, COUNT(*) AS n, AVG(rating) AS avg_rating, MAX(collected_at) AS last_collected
            FROM reviews
            GROUP BY app_id, country
            ORDER BY n DESC, app_id, country
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoreSummary {
                app_id: row.get("app_id"),
                country: row.get("country"),
                reviews: row.get("n"),
                average_rating: row.get("avg_rating"),
                last_collected_at: row.get("last_collected"),
            })
            .collect())
    }
}

fn row_to_review(row: &SqliteRow) -> Result<Review> {
    let source: String = row.get("source");
    Ok(Review {
        app_id: row.get("app_id"),
        country: row.get("country"),
        review_id: row.get("review_id"),
        author: row.get("author"),
        title: row.get("title"),
        body: row.get("body"),
        rating: row.get("rating"),
        version: row.get("version"),
        submitted_at: row.get("submitted_at"),
        source: source.parse::<SourceKind>()?,
    })
}
