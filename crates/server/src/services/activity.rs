//! Append-only audit trail. Writes are fire-and-forget: a failed insert
//! is logged and swallowed, it never aborts the operation being audited.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn record(pool: &SqlitePool, user_id: &str, action: &str) {
    let result = sqlx::query("INSERT INTO activity (id, user_id, action, timestamp) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(action)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await;

    if let Err(e) = result {
        tracing::warn!("failed to record activity '{action}' for user {user_id}: {e}");
    }
}
