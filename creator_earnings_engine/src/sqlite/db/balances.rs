//! Creator balance rows. Every write here is guarded so that a bucket can never go negative; the `CHECK` constraints
//! in the schema back this up.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{CreatorBalance, MinorUnits},
    traits::LedgerError,
};

/// Takes the database write lock and returns the creator's balance row, creating an empty one if needed.
///
/// Call this first in any transaction that reads a balance before changing it.
pub async fn lock_balance(
    creator_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    let balance = sqlx::query_as(
        r#"
            INSERT INTO creator_balances (creator_id, updated_at) VALUES ($1, $2)
            ON CONFLICT (creator_id) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(creator_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

pub async fn fetch_balance(creator_id: &str, conn: &mut SqliteConnection) -> Result<Option<CreatorBalance>, LedgerError> {
    let balance = sqlx::query_as("SELECT * FROM creator_balances WHERE creator_id = $1")
        .bind(creator_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance)
}

/// A new posting: `pending += net`, `total_earned += net`.
pub async fn credit_pending(
    creator_id: &str,
    net: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    let balance = sqlx::query_as(
        r#"
            INSERT INTO creator_balances (creator_id, pending, total_earned, first_earning_at, last_earning_at, updated_at)
            VALUES ($1, $2, $2, $3, $3, $3)
            ON CONFLICT (creator_id) DO UPDATE SET
                pending = pending + excluded.pending,
                total_earned = total_earned + excluded.total_earned,
                first_earning_at = COALESCE(first_earning_at, excluded.first_earning_at),
                last_earning_at = excluded.last_earning_at,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(creator_id)
    .bind(net)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Clearing: `pending -= net`, `available += net`.
pub async fn move_pending_to_available(
    creator_id: &str,
    net: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    sqlx::query_as(
        r#"
            UPDATE creator_balances SET pending = pending - $1, available = available + $1, updated_at = $2
            WHERE creator_id = $3 AND pending >= $1
            RETURNING *;
        "#,
    )
    .bind(net)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!(
            "Creator {creator_id} does not have {net} pending to clear"
        ))
    })
}

/// Refund: takes `net` out of `pending` (or `available` if the earning had cleared) and adds it to `total_refunded`.
pub async fn reverse_earning(
    creator_id: &str,
    net: MinorUnits,
    from_available: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    let sql = if from_available {
        r#"
            UPDATE creator_balances SET available = available - $1, total_refunded = total_refunded + $1,
            updated_at = $2
            WHERE creator_id = $3 AND available >= $1
            RETURNING *;
        "#
    } else {
        r#"
            UPDATE creator_balances SET pending = pending - $1, total_refunded = total_refunded + $1, updated_at = $2
            WHERE creator_id = $3 AND pending >= $1
            RETURNING *;
        "#
    };
    sqlx::query_as(sql).bind(net).bind(now).bind(creator_id).fetch_optional(conn).await?.ok_or_else(|| {
        let bucket = if from_available { "available" } else { "pending" };
        LedgerError::LedgerInvariantViolation(format!(
            "Refunding {net} would drive the {bucket} balance of creator {creator_id} negative"
        ))
    })
}

/// Reservation: `available -= amount`, `locked += amount`. Returns `None` if there is not enough available.
pub async fn reserve(
    creator_id: &str,
    amount: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorBalance>, LedgerError> {
    let balance = sqlx::query_as(
        r#"
            UPDATE creator_balances SET available = available - $1, locked = locked + $1, updated_at = $2
            WHERE creator_id = $3 AND available >= $1
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?;
    Ok(balance)
}

/// Commit: `locked -= amount`, `total_withdrawn += amount`.
pub async fn commit_reserved(
    creator_id: &str,
    amount: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    sqlx::query_as(
        r#"
            UPDATE creator_balances SET locked = locked - $1, total_withdrawn = total_withdrawn + $1, updated_at = $2
            WHERE creator_id = $3 AND locked >= $1
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Creator {creator_id} does not have {amount} locked to commit"))
    })
}

/// Release: `locked -= amount`, `available += amount`.
pub async fn release_reserved(
    creator_id: &str,
    amount: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    sqlx::query_as(
        r#"
            UPDATE creator_balances SET locked = locked - $1, available = available + $1, updated_at = $2
            WHERE creator_id = $3 AND locked >= $1
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Creator {creator_id} does not have {amount} locked to release"))
    })
}
