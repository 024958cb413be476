use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_id TEXT NOT NULL,
            country TEXT NOT NULL,
            review_id TEXT NOT NULL,
            author TEXT,
            title TEXT,
            body TEXT NOT NULL DEFAULT '',
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            version TEXT,
            submitted_at INTEGER,
            source TEXT NOT NULL,
            collected_at INTEGER NOT NULL,
            UNIQUE(app_id, country, review_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_app_country ON reviews(app_id, country)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reviews_submitted_at ON reviews(app_id, country, submitted_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
