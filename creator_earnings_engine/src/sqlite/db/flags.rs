use chrono::{DateTime, Utc};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{FlagStatus, FlagType, FraudFlag, NewFraudFlag},
    traits::LedgerError,
};

const SEVERITY_ORDER: &str =
    "CASE severity WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END ASC, created_at DESC";

/// Inserts the flag unless its dedup key is taken, or a flag of the same type was raised for the creator after
/// `quiet_since`. Returns `None` when nothing was inserted.
pub async fn insert_flag(
    flag: NewFraudFlag,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FraudFlag>, LedgerError> {
    let flag = sqlx::query_as(
        r#"
            INSERT INTO fraud_flags (creator_id, flag_type, severity, score, details, dedup_key, created_at)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE $8 IS NULL OR NOT EXISTS (
                SELECT 1 FROM fraud_flags WHERE creator_id = $1 AND flag_type = $2 AND created_at > $8
            )
            ON CONFLICT (dedup_key) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(flag.creator_id)
    .bind(flag.flag_type)
    .bind(flag.severity)
    .bind(flag.score)
    .bind(Json(flag.details))
    .bind(flag.dedup_key)
    .bind(flag.raised_at.unwrap_or(now))
    .bind(flag.quiet_since)
    .fetch_optional(conn)
    .await?;
    Ok(flag)
}

pub async fn fetch_flag(id: i64, conn: &mut SqliteConnection) -> Result<Option<FraudFlag>, LedgerError> {
    let flag = sqlx::query_as("SELECT * FROM fraud_flags WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(flag)
}

pub async fn fetch_open_flags(creator_id: &str, conn: &mut SqliteConnection) -> Result<Vec<FraudFlag>, LedgerError> {
    let sql = format!("SELECT * FROM fraud_flags WHERE creator_id = $1 AND status = 'open' ORDER BY {SEVERITY_ORDER}");
    let flags = sqlx::query_as(&sql).bind(creator_id).fetch_all(conn).await?;
    Ok(flags)
}

pub async fn fetch_all_open_flags(conn: &mut SqliteConnection) -> Result<Vec<FraudFlag>, LedgerError> {
    let sql = format!("SELECT * FROM fraud_flags WHERE status = 'open' ORDER BY {SEVERITY_ORDER}");
    let flags = sqlx::query_as(&sql).fetch_all(conn).await?;
    Ok(flags)
}

/// Open flags with severity high or critical.
pub async fn count_blocking_flags(creator_id: &str, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM fraud_flags WHERE creator_id = $1 AND status = 'open' AND severity IN ('high', \
         'critical')",
    )
    .bind(creator_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Compare-and-set `open → status`. Single-open dedup keys are released so that a new flag of the same type can be
/// raised later.
pub async fn close_flag(
    id: i64,
    status: FlagStatus,
    reviewer: &str,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FraudFlag>, LedgerError> {
    let flag = sqlx::query_as(
        r#"
            UPDATE fraud_flags SET status = $1, reviewed_by = $2, reviewed_at = $3, review_note = $4,
            dedup_key = CASE WHEN dedup_key LIKE '%:open' THEN NULL ELSE dedup_key END
            WHERE id = $5 AND status = 'open'
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(reviewer)
    .bind(now)
    .bind(note)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(flag)
}

pub async fn auto_clear(
    creator_id: &str,
    flag_type: FlagType,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<FraudFlag>, LedgerError> {
    let flags = sqlx::query_as(
        r#"
            UPDATE fraud_flags SET status = 'cleared', reviewed_by = 'system', reviewed_at = $1, review_note = $2,
            auto_cleared = 1,
            dedup_key = CASE WHEN dedup_key LIKE '%:open' THEN NULL ELSE dedup_key END
            WHERE creator_id = $3 AND flag_type = $4 AND status = 'open'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(note)
    .bind(creator_id)
    .bind(flag_type)
    .fetch_all(conn)
    .await?;
    Ok(flags)
}
