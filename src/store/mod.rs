//! Durable relational store access, shared by the Post Worker (C7) and Get
//! Worker (C8).
//!
//! Follows `together-server/src/handlers/messages.rs`'s style: runtime-built
//! queries via `query_scalar`/`query_as` over raw SQL rather than the
//! `sqlx::query!` macro, so the crate builds without a live database
//! connection at compile time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Hard cap on the number of messages a single pagination response may
/// contain (`spec.md §3`: "`min(limit, 100)`").
pub const MAX_LIMIT: i64 = 100;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Create the `message` table if it doesn't already exist. Run once at Post
/// Worker startup; `spec.md §4.7` doesn't require the Get Worker to do this.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message (
            id SERIAL PRIMARY KEY,
            inserted TIMESTAMPTZ NOT NULL DEFAULT now(),
            message JSONB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map(|_| ())
}

/// Insert `payload` as a new row, returning its assigned id. Ids are
/// strictly increasing with insertion order within a store (`SERIAL`).
pub async fn insert_message(pool: &PgPool, payload: &Value) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO message (message) VALUES ($1) RETURNING id")
            .bind(payload)
            .fetch_one(pool)
            .await?;
    Ok(id)
}

/// A single durable record (`spec.md §3`'s "Stored Message"): `id` is
/// strictly increasing with insertion order, `inserted` is the server-side
/// write timestamp, `message` is the arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub inserted: DateTime<Utc>,
    pub message: Value,
}

/// Fetch a single stored record by id, or `None` if it doesn't exist (or was
/// never inserted).
pub async fn get_message(pool: &PgPool, id: i64) -> Result<Option<StoredMessage>, sqlx::Error> {
    sqlx::query_as("SELECT id, inserted, message FROM message WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Clip a requested limit to the hard cap; the clipped value is what the
/// response must echo back as `limit`.
pub fn effective_limit(requested: i64) -> i64 {
    requested.min(MAX_LIMIT)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSnapshot {
    pub pagination_id: i64,
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
    pub messages: Vec<Value>,
}

/// Run the Get Worker's pagination algorithm (`spec.md §4.8`) in its own
/// read-only transaction: pin `pagination_id` (or resolve it from the
/// current max id), count everything at-or-before it, and slice the
/// requested page out of that frozen set.
pub async fn paginate(
    pool: &PgPool,
    offset: i64,
    limit: i64,
    pagination_id: Option<i64>,
) -> Result<PaginationSnapshot, sqlx::Error> {
    let limit = effective_limit(limit);
    let mut tx = pool.begin().await?;

    let max_id: Option<i64> = sqlx::query_scalar("SELECT max(id) FROM message")
        .fetch_one(&mut *tx)
        .await?;

    let Some(max_id) = max_id else {
        tx.commit().await?;
        return Ok(PaginationSnapshot {
            pagination_id: 0,
            offset,
            limit,
            total: 0,
            messages: Vec::new(),
        });
    };

    let pagination_id = pagination_id.unwrap_or(max_id);

    let total: i64 = sqlx::query_scalar("SELECT count(*) FROM message WHERE id <= $1")
        .bind(pagination_id)
        .fetch_one(&mut *tx)
        .await?;

    let messages: Vec<Value> = sqlx::query_scalar(
        "SELECT message FROM message WHERE id <= $1 ORDER BY id DESC OFFSET $2 LIMIT $3",
    )
    .bind(pagination_id)
    .bind(offset)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(PaginationSnapshot {
        pagination_id,
        offset,
        limit,
        total,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_of_200_clips_to_100() {
        assert_eq!(effective_limit(200), 100);
    }

    #[test]
    fn stored_message_equality_ignores_nothing() {
        let a = StoredMessage {
            id: 1,
            inserted: Utc::now(),
            message: Value::from(serde_json::json!({"a": 1})),
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn limit_under_cap_passes_through() {
        assert_eq!(effective_limit(10), 10);
    }

    #[test]
    fn pagination_snapshot_serializes_pagination_id_as_camel_case() {
        let snapshot = PaginationSnapshot {
            pagination_id: 97,
            offset: 0,
            limit: 10,
            total: 97,
            messages: vec![],
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["paginationId"], 97);
        assert!(value.get("pagination_id").is_none());
    }
}
