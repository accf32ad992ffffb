//! Balance reservations. A reservation moves money from `available` to `locked` and stays `held` until it is
//! committed (the money leaves) or released (the money goes back). The balance replay reads these rows to account for
//! locked and withdrawn funds.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::balances;
use crate::{
    db_types::{CreatorBalance, MinorUnits},
    traits::{LedgerError, ReservationToken},
};

/// Locks `amount` of the creator's available balance. Returns `None` if there is not enough available.
pub async fn hold(
    creator_id: &str,
    amount: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReservationToken>, LedgerError> {
    if balances::reserve(creator_id, amount, now, conn).await?.is_none() {
        return Ok(None);
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO balance_reservations (creator_id, amount, created_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(creator_id)
    .bind(amount)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(Some(ReservationToken::new(id, creator_id, amount)))
}

/// The token for a reservation that is still held.
pub async fn fetch_held(id: i64, conn: &mut SqliteConnection) -> Result<Option<ReservationToken>, LedgerError> {
    let row: Option<(i64, String, MinorUnits)> =
        sqlx::query_as("SELECT id, creator_id, amount FROM balance_reservations WHERE id = $1 AND status = 'held'")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(id, creator_id, amount)| ReservationToken::new(id, &creator_id, amount)))
}

/// Compare-and-set `held → status`.
async fn settle(
    token: &ReservationToken,
    status: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let settled: Option<i64> = sqlx::query_scalar(
        r#"
            UPDATE balance_reservations SET status = $1, settled_at = $2
            WHERE id = $3 AND creator_id = $4 AND amount = $5 AND status = 'held'
            RETURNING id;
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(token.id())
    .bind(token.creator_id())
    .bind(token.amount())
    .fetch_optional(conn)
    .await?;
    settled.map(|_| ()).ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Reservation #{} is not held and cannot be {status}", token.id()))
    })
}

/// The reserved money leaves the ledger: `locked -= amount`, `total_withdrawn += amount`.
pub async fn commit(
    token: ReservationToken,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    settle(&token, "committed", now, conn).await?;
    balances::commit_reserved(token.creator_id(), token.amount(), now, conn).await
}

/// The reserved money goes back: `locked -= amount`, `available += amount`.
pub async fn release(
    token: ReservationToken,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorBalance, LedgerError> {
    settle(&token, "released", now, conn).await?;
    balances::release_reserved(token.creator_id(), token.amount(), now, conn).await
}

/// `(held, committed)` totals for the creator.
pub async fn totals(creator_id: &str, conn: &mut SqliteConnection) -> Result<(MinorUnits, MinorUnits), LedgerError> {
    let (held, committed): (i64, i64) = sqlx::query_as(
        r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'held' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'committed' THEN amount ELSE 0 END), 0)
            FROM balance_reservations WHERE creator_id = $1;
        "#,
    )
    .bind(creator_id)
    .fetch_one(conn)
    .await?;
    Ok((MinorUnits::from(held), MinorUnits::from(committed)))
}
