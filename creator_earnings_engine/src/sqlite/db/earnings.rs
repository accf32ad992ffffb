use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{CreatorEarning, MinorUnits, Payment},
    traits::{FeeSplit, LedgerError},
};

/// Inserts the earning for a payment. Returns `None` if the payment has already been posted.
pub async fn idempotent_insert(
    payment: &Payment,
    creator_id: &str,
    split: FeeSplit,
    clearing_delay: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorEarning>, LedgerError> {
    let earning = sqlx::query_as(
        r#"
            INSERT INTO creator_earnings (creator_id, payer_id, payment_id, gross_amount, platform_fee, net_amount,
            currency, clears_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(creator_id)
    .bind(&payment.payer_id)
    .bind(payment.id)
    .bind(split.gross)
    .bind(split.fee)
    .bind(split.net)
    .bind(&payment.currency)
    .bind(now + clearing_delay)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(earning)
}

pub async fn fetch_earning(id: i64, conn: &mut SqliteConnection) -> Result<Option<CreatorEarning>, LedgerError> {
    let earning = sqlx::query_as("SELECT * FROM creator_earnings WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(earning)
}

pub async fn fetch_earning_for_payment(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorEarning>, LedgerError> {
    let earning = sqlx::query_as("SELECT * FROM creator_earnings WHERE payment_id = $1")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(earning)
}

pub async fn fetch_earnings_for_creator(
    creator_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<CreatorEarning>, LedgerError> {
    let earnings = sqlx::query_as("SELECT * FROM creator_earnings WHERE creator_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(creator_id)
        .fetch_all(conn)
        .await?;
    Ok(earnings)
}

pub async fn fetch_due(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CreatorEarning>, LedgerError> {
    let earnings = sqlx::query_as(
        "SELECT * FROM creator_earnings WHERE status = 'pending' AND clears_at <= $1 ORDER BY clears_at ASC LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(earnings)
}

/// Compare-and-set `pending → cleared` for a due earning. This is the commit point of a clearing operation.
pub async fn mark_cleared(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorEarning>, LedgerError> {
    let earning = sqlx::query_as(
        r#"
            UPDATE creator_earnings SET status = 'cleared', cleared_at = $1
            WHERE id = $2 AND status = 'pending' AND clears_at <= $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(earning)
}

/// Compare-and-set `pending | cleared → refunded`.
pub async fn mark_refunded(
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorEarning>, LedgerError> {
    let earning = sqlx::query_as(
        r#"
            UPDATE creator_earnings SET status = 'refunded', refunded_at = $1, refund_reason = $2
            WHERE id = $3 AND status IN ('pending', 'cleared')
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(reason)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(earning)
}

pub async fn count_since(creator_id: &str, since: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM creator_earnings WHERE creator_id = $1 AND created_at > $2")
        .bind(creator_id)
        .bind(since)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

pub async fn payer_diversity(creator_id: &str, conn: &mut SqliteConnection) -> Result<(i64, i64), LedgerError> {
    let counts: (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT payer_id) FROM creator_earnings WHERE creator_id = $1")
            .bind(creator_id)
            .fetch_one(conn)
            .await?;
    Ok(counts)
}

/// `(pending, cleared)` net totals, excluding refunded earnings.
pub async fn net_totals(creator_id: &str, conn: &mut SqliteConnection) -> Result<(MinorUnits, MinorUnits), LedgerError> {
    let (pending, cleared): (i64, i64) = sqlx::query_as(
        r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN net_amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'cleared' THEN net_amount ELSE 0 END), 0)
            FROM creator_earnings WHERE creator_id = $1
        "#,
    )
    .bind(creator_id)
    .fetch_one(conn)
    .await?;
    Ok((MinorUnits::from(pending), MinorUnits::from(cleared)))
}
