//! Subscription store and usage recorder (SQLite)

use chrono::Utc;
use intake_core::SubscriptionSnapshot;
use sqlx::sqlite::SqlitePool;

use crate::models::{SubscriptionRow, UploadRecord};

/// Idempotent schema setup
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pdf_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            status TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_pdf_records_user ON pdf_records(user_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id TEXT PRIMARY KEY,
            plan TEXT NOT NULL DEFAULT 'free',
            upload_limit INTEGER NOT NULL,
            valid_until TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Migrations complete");
    Ok(())
}

pub async fn get_subscription(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<SubscriptionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubscriptionRow>(
        "SELECT plan, upload_limit, valid_until FROM subscriptions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Uploads recorded for a user, across all time
pub async fn get_upload_count(pool: &SqlitePool, user_id: &str) -> Result<u32, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pdf_records WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Subscription plus usage; users without a row get the free plan
pub async fn snapshot(
    pool: &SqlitePool,
    user_id: &str,
    default_limit: u32,
) -> Result<(SubscriptionSnapshot, Option<String>), sqlx::Error> {
    let used = get_upload_count(pool, user_id).await?;
    let snapshot = match get_subscription(pool, user_id).await? {
        Some(row) => (
            SubscriptionSnapshot {
                plan_name: row.plan,
                upload_limit: u32::try_from(row.upload_limit.max(0)).unwrap_or(u32::MAX),
                uploads_used: used,
            },
            row.valid_until,
        ),
        None => (SubscriptionSnapshot::free(default_limit, used), None),
    };
    Ok(snapshot)
}

pub async fn record_upload(
    pool: &SqlitePool,
    filename: &str,
    status: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO pdf_records (filename, status, user_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(filename)
        .bind(status)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    tracing::info!(user_id, filename, status, "Recorded upload");
    Ok(())
}

/// Newest first
pub async fn list_uploads(pool: &SqlitePool, user_id: &str) -> Result<Vec<UploadRecord>, sqlx::Error> {
    sqlx::query_as::<_, UploadRecord>(
        r#"
        SELECT id, filename, status, user_id, created_at
        FROM pdf_records
        WHERE user_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Create or replace a user's subscription
#[cfg(test)]
pub async fn upsert_subscription(
    pool: &SqlitePool,
    user_id: &str,
    plan: &str,
    upload_limit: u32,
    valid_until: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, plan, upload_limit, valid_until)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            plan = excluded.plan,
            upload_limit = excluded.upload_limit,
            valid_until = excluded.valid_until
        "#,
    )
    .bind(user_id)
    .bind(plan)
    .bind(i64::from(upload_limit))
    .bind(valid_until)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_subscription_is_free_plan() {
        let pool = pool().await;
        let (snapshot, valid_until) = snapshot(&pool, "u1", 5).await.unwrap();
        assert_eq!(snapshot, SubscriptionSnapshot::free(5, 0));
        assert_eq!(valid_until, None);
    }

    #[tokio::test]
    async fn test_count_and_history() {
        let pool = pool().await;
        record_upload(&pool, "a.pdf", "processed", "u1").await.unwrap();
        record_upload(&pool, "b.pdf", "processed", "u1").await.unwrap();
        record_upload(&pool, "c.pdf", "processed", "u2").await.unwrap();

        assert_eq!(get_upload_count(&pool, "u1").await.unwrap(), 2);
        let history = list_uploads(&pool, "u1").await.unwrap();
        let names: Vec<_> = history.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
        assert!(history.iter().all(|r| r.status == "processed"));
    }

    #[tokio::test]
    async fn test_subscription_row_wins() {
        let pool = pool().await;
        upsert_subscription(&pool, "u1", "basic", 50, Some("2027-01-01"))
            .await
            .unwrap();
        record_upload(&pool, "a.pdf", "processed", "u1").await.unwrap();

        let (snapshot, valid_until) = snapshot(&pool, "u1", 5).await.unwrap();
        assert_eq!(snapshot.plan_name, "basic");
        assert_eq!(snapshot.upload_limit, 50);
        assert_eq!(snapshot.remaining(), 49);
        assert_eq!(valid_until.as_deref(), Some("2027-01-01"));
    }
}
