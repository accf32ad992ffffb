use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, Payment, PaymentStatus, Provider},
    traits::LedgerError,
};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, LedgerError> {
    let now = Utc::now();
    let provider = payment.provider;
    let reference = payment.provider_reference.clone();
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (payer_id, creator_id, plan_id, amount, currency, provider, provider_reference,
            created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *;
        "#,
    )
    .bind(payment.payer_id)
    .bind(payment.creator_id)
    .bind(payment.plan_id)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(payment.provider)
    .bind(payment.provider_reference)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::PaymentAlreadyExists(provider, reference)
        },
        _ => LedgerError::from(e),
    })?;
    Ok(payment)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_reference(
    provider: Provider,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE provider = $1 AND provider_reference = $2")
        .bind(provider)
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// Takes the write lock on the payment row and returns it unchanged.
pub async fn touch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("UPDATE payments SET updated_at = updated_at WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// Compare-and-set `pending → success`. Returns `None` if the payment is not pending (or does not exist).
pub async fn mark_success(
    provider: Provider,
    reference: &str,
    provider_txn_id: &str,
    paid_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET status = 'success', provider_txn_id = $1, paid_at = $2, expires_at = $3, updated_at = $4
            WHERE provider = $5 AND provider_reference = $6 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(provider_txn_id)
    .bind(paid_at)
    .bind(expires_at)
    .bind(Utc::now())
    .bind(provider)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Compare-and-set `pending → failed | cancelled`. Returns `None` if the payment is not pending.
pub async fn mark_unsuccessful(
    provider: Provider,
    reference: &str,
    status: PaymentStatus,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET status = $1, failure_reason = $2, updated_at = $3
            WHERE provider = $4 AND provider_reference = $5 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(reason)
    .bind(Utc::now())
    .bind(provider)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Compare-and-set `success → refunded`.
pub async fn mark_refunded(
    provider: Provider,
    reference: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET status = 'refunded', failure_reason = $1, updated_at = $2
            WHERE provider = $3 AND provider_reference = $4 AND status = 'success'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(Utc::now())
    .bind(provider)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_stale_pending(
    older_than: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, LedgerError> {
    let payments = sqlx::query_as(
        "SELECT * FROM payments WHERE status = 'pending' AND created_at < $1 ORDER BY created_at ASC LIMIT $2",
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn fetch_payments_for_payer(payer_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Payment>, LedgerError> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE payer_id = $1 ORDER BY created_at DESC")
        .bind(payer_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}
