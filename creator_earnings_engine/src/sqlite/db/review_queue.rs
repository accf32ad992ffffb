use chrono::{DateTime, Utc};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewReviewItem, ReviewItem},
    traits::LedgerError,
};

pub async fn insert_item(
    item: NewReviewItem,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReviewItem, LedgerError> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO reconciliation_queue (source, reference, reason, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(item.source)
    .bind(item.reference)
    .bind(item.reason)
    .bind(item.payload.map(Json))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_open_items(conn: &mut SqliteConnection) -> Result<Vec<ReviewItem>, LedgerError> {
    let items = sqlx::query_as("SELECT * FROM reconciliation_queue WHERE resolved_at IS NULL ORDER BY created_at, id")
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Marks an open item as resolved. Resolving an already-resolved item returns `None`.
pub async fn resolve_item(
    id: i64,
    resolver: &str,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReviewItem>, LedgerError> {
    let item = sqlx::query_as(
        r#"
            UPDATE reconciliation_queue SET resolved_at = $1, resolved_by = $2, resolution_note = $3
            WHERE id = $4 AND resolved_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(resolver)
    .bind(note)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(item)
}
