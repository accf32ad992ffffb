use chrono::{DateTime, Utc};

use crate::{
    db_types::{CreatorEarning, NewPayment, Payment, PaymentOutcome, Provider},
    traits::{data_objects::PaymentStatusChange, LedgerError, LedgerPolicy},
};

/// Backend behaviour for recording payment attempts and applying provider outcomes to them.
///
/// `(provider, provider_reference)` identifies a payment everywhere in this trait. It is also the idempotency key:
/// applying the same outcome twice has the same effect as applying it once.
#[allow(async_fn_in_trait)]
pub trait PaymentReconciliation: Clone {
    /// Records a new `pending` payment. Fails with [`LedgerError::PaymentAlreadyExists`] if the reference is taken.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, LedgerError>;

    async fn fetch_payment_by_reference(
        &self,
        provider: Provider,
        reference: &str,
    ) -> Result<Option<Payment>, LedgerError>;

    /// Applies a provider outcome in a single atomic transaction.
    ///
    /// * A pending payment moves to the outcome's terminal status. Exactly one caller wins if several race.
    /// * On success, `paid_at` and `expires_at` are stamped and, if the payment belongs to a creator, the earning is
    ///   posted in the same transaction.
    /// * If the payment is already in the outcome's status, nothing happens and `changed` is false.
    /// * If the payment is in a different terminal status, [`LedgerError::Conflict`] is returned.
    /// * If the outcome reports a different amount, [`LedgerError::AmountMismatch`] is returned and the payment stays
    ///   pending.
    async fn apply_outcome(
        &self,
        outcome: &PaymentOutcome,
        policy: &LedgerPolicy,
    ) -> Result<PaymentStatusChange, LedgerError>;

    /// Moves a successful payment to `refunded` and refunds its earning (if it has one) in the same transaction.
    async fn refund_payment(
        &self,
        provider: Provider,
        reference: &str,
        reason: &str,
    ) -> Result<(Payment, Option<CreatorEarning>), LedgerError>;

    /// Pending payments created before `older_than`, oldest first. These are candidates for polling the provider.
    async fn fetch_stale_pending_payments(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, LedgerError>;

    async fn fetch_payments_for_payer(&self, payer_id: &str) -> Result<Vec<Payment>, LedgerError>;
}
