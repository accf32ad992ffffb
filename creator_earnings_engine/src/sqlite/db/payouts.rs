use chrono::{DateTime, Utc};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{CreatorPayout, MinorUnits, NewPayoutRequest, PayoutStatus},
    traits::LedgerError,
};

pub async fn insert_payout(
    request: &NewPayoutRequest,
    fee: MinorUnits,
    cap_week: i64,
    reservation_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorPayout, LedgerError> {
    let payout = sqlx::query_as(
        r#"
            INSERT INTO creator_payouts (creator_id, amount, fee, net_amount, method, destination, cap_week,
            reservation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(&request.creator_id)
    .bind(request.amount)
    .bind(fee)
    .bind(request.amount - fee)
    .bind(request.destination.method())
    .bind(Json(&request.destination))
    .bind(cap_week)
    .bind(reservation_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(payout)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<CreatorPayout>, LedgerError> {
    let payout = sqlx::query_as("SELECT * FROM creator_payouts WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payout)
}

pub async fn fetch_payouts_for_creator(
    creator_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<CreatorPayout>, LedgerError> {
    let payouts = sqlx::query_as("SELECT * FROM creator_payouts WHERE creator_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(creator_id)
        .fetch_all(conn)
        .await?;
    Ok(payouts)
}

/// Compare-and-set `pending → processing`.
pub async fn mark_processing(
    id: i64,
    reviewer: &str,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorPayout>, LedgerError> {
    let payout = sqlx::query_as(
        r#"
            UPDATE creator_payouts SET status = 'processing', reviewed_by = $1, reviewed_at = $2, review_note = $3,
            updated_at = $2
            WHERE id = $4 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(reviewer)
    .bind(now)
    .bind(note)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Compare-and-set `processing → completed`.
pub async fn mark_completed(
    id: i64,
    provider_reference: &str,
    provider_txn_id: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorPayout>, LedgerError> {
    let payout = sqlx::query_as(
        r#"
            UPDATE creator_payouts SET status = 'completed', provider_reference = $1, provider_txn_id = $2,
            completed_at = $3, updated_at = $3
            WHERE id = $4 AND status = 'processing'
            RETURNING *;
        "#,
    )
    .bind(provider_reference)
    .bind(provider_txn_id)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Compare-and-set `from → to` for the unsuccessful endings (`failed` from processing, `cancelled` from pending).
pub async fn mark_unsuccessful(
    id: i64,
    from: PayoutStatus,
    to: PayoutStatus,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorPayout>, LedgerError> {
    let payout = sqlx::query_as(
        r#"
            UPDATE creator_payouts SET status = $1, failure_reason = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(reason)
    .bind(now)
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}
