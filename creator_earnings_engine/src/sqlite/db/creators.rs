use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Creator, MinorUnits, SubscriptionPlan},
    traits::LedgerError,
};

pub async fn fetch_creator(creator_id: &str, conn: &mut SqliteConnection) -> Result<Option<Creator>, LedgerError> {
    let creator =
        sqlx::query_as("SELECT * FROM creators WHERE creator_id = $1").bind(creator_id).fetch_optional(conn).await?;
    Ok(creator)
}

pub async fn upsert_creator(
    creator_id: &str,
    subscription_price: MinorUnits,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Creator, LedgerError> {
    let creator = sqlx::query_as(
        r#"
            INSERT INTO creators (creator_id, subscription_price, created_at, updated_at) VALUES ($1, $2, $3, $3)
            ON CONFLICT (creator_id) DO UPDATE SET
                subscription_price = excluded.subscription_price,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(creator_id)
    .bind(subscription_price)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(creator)
}

/// Takes the write lock on the creator row and returns it as it was.
pub async fn touch_creator(
    creator_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Creator>, LedgerError> {
    let creator = sqlx::query_as("UPDATE creators SET updated_at = $1 WHERE creator_id = $2 RETURNING *")
        .bind(now)
        .bind(creator_id)
        .fetch_optional(conn)
        .await?;
    Ok(creator)
}

/// Activation only ever moves earlier, so repeating it is harmless.
pub async fn set_activated(
    creator_id: &str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Creator>, LedgerError> {
    let creator = sqlx::query_as(
        r#"
            UPDATE creators SET
                activated_at = CASE WHEN activated_at IS NULL OR activated_at > $1 THEN $1 ELSE activated_at END,
                updated_at = $2
            WHERE creator_id = $3
            RETURNING *;
        "#,
    )
    .bind(at)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?;
    Ok(creator)
}

/// Sets or clears the suspension. A `None` reason lifts it.
pub async fn set_suspension(
    creator_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Creator>, LedgerError> {
    let suspended_at = reason.map(|_| now);
    let creator = sqlx::query_as(
        r#"
            UPDATE creators SET suspended_at = $1, suspend_reason = $2, updated_at = $3
            WHERE creator_id = $4
            RETURNING *;
        "#,
    )
    .bind(suspended_at)
    .bind(reason)
    .bind(now)
    .bind(creator_id)
    .fetch_optional(conn)
    .await?;
    Ok(creator)
}

pub async fn subscription_prices(conn: &mut SqliteConnection) -> Result<Vec<MinorUnits>, LedgerError> {
    let prices = sqlx::query_scalar("SELECT subscription_price FROM creators WHERE subscription_price > 0")
        .fetch_all(conn)
        .await?;
    Ok(prices)
}

pub async fn upsert_plan(plan: SubscriptionPlan, conn: &mut SqliteConnection) -> Result<SubscriptionPlan, LedgerError> {
    let plan = sqlx::query_as(
        r#"
            INSERT INTO subscription_plans (plan_id, creator_id, price, currency, platform_fee_bps)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (plan_id) DO UPDATE SET
                creator_id = excluded.creator_id,
                price = excluded.price,
                currency = excluded.currency,
                platform_fee_bps = excluded.platform_fee_bps
            RETURNING *;
        "#,
    )
    .bind(plan.plan_id)
    .bind(plan.creator_id)
    .bind(plan.price)
    .bind(plan.currency)
    .bind(plan.platform_fee_bps)
    .fetch_one(conn)
    .await?;
    Ok(plan)
}

pub async fn fetch_plan(plan_id: &str, conn: &mut SqliteConnection) -> Result<Option<SubscriptionPlan>, LedgerError> {
    let plan =
        sqlx::query_as("SELECT * FROM subscription_plans WHERE plan_id = $1").bind(plan_id).fetch_optional(conn).await?;
    Ok(plan)
}
