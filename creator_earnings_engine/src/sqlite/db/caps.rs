use sqlx::SqliteConnection;

use crate::{
    cee_api::risk_rules::CapWindow,
    db_types::{MinorUnits, PayoutCap},
    traits::LedgerError,
};

pub async fn fetch_cap(creator_id: &str, week: i64, conn: &mut SqliteConnection) -> Result<Option<PayoutCap>, LedgerError> {
    let cap = sqlx::query_as("SELECT * FROM payout_caps WHERE creator_id = $1 AND week_number = $2")
        .bind(creator_id)
        .bind(week)
        .fetch_optional(conn)
        .await?;
    Ok(cap)
}

/// Creates the cap row for the window if it does not exist yet. An existing row is left untouched.
pub async fn materialize(creator_id: &str, window: &CapWindow, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
            INSERT INTO payout_caps (creator_id, week_number, max_amount, window_start, window_end)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (creator_id, week_number) DO NOTHING
        "#,
    )
    .bind(creator_id)
    .bind(window.week)
    .bind(window.max_amount)
    .bind(window.starts_at)
    .bind(window.ends_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// `used += amount`, only if that stays within the cap. Returns `None` otherwise.
pub async fn consume(
    creator_id: &str,
    week: i64,
    amount: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutCap>, LedgerError> {
    let cap = sqlx::query_as(
        r#"
            UPDATE payout_caps SET used_amount = used_amount + $1
            WHERE creator_id = $2 AND week_number = $3 AND used_amount + $1 <= max_amount
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(creator_id)
    .bind(week)
    .fetch_optional(conn)
    .await?;
    Ok(cap)
}

/// Gives back cap consumed by a payout that did not go through.
pub async fn release(
    creator_id: &str,
    week: i64,
    amount: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<PayoutCap, LedgerError> {
    sqlx::query_as(
        r#"
            UPDATE payout_caps SET used_amount = used_amount - $1
            WHERE creator_id = $2 AND week_number = $3 AND used_amount >= $1
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(creator_id)
    .bind(week)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!(
            "Cannot release {amount} of week {week} cap for creator {creator_id}"
        ))
    })
}
