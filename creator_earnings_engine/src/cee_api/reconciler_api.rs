use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::Value;

use super::review_api::queue_violation;
use crate::{
    db_types::{
        CreatorEarning,
        EarningStatus,
        NewPayment,
        NewReviewItem,
        Payment,
        PaymentOutcome,
        PaymentStatus,
        Provider,
        ReviewSource,
    },
    events::{EarningPostedEvent, EarningRefundedEvent, EventProducers, PaymentFailedEvent},
    traits::{LedgerError, LedgerPolicy, PaymentReconciliation, PaymentStatusChange, ReviewQueue},
};

/// `ReconcilerApi` turns provider outcomes into payment state changes and earnings postings.
///
/// Outcomes can arrive from a provider callback, a client-triggered verification or the reconciliation poller, in
/// any order and any number of times. Applying an outcome is idempotent, so callers never need to coordinate.
#[derive(Clone)]
pub struct ReconcilerApi<B> {
    db: B,
    producers: EventProducers,
    policy: LedgerPolicy,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi ({:?})", self.policy)
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, policy: LedgerPolicy::default() }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }
}

impl<B> ReconcilerApi<B>
where B: PaymentReconciliation + ReviewQueue
{
    /// Records a new `pending` payment before the customer is sent to the provider.
    pub async fn initiate_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        if !payment.amount.is_positive() {
            return Err(LedgerError::InvalidRequest(format!("Payment amount must be positive, not {}", payment.amount)));
        }
        let payment = self.db.insert_payment(payment).await?;
        info!(
            "🔄️ Payment #{} initiated: {} {} via {} ({})",
            payment.id, payment.amount, payment.currency, payment.provider, payment.provider_reference
        );
        Ok(payment)
    }

    /// Applies a provider outcome.
    ///
    /// Conflicts, amount mismatches and invariant violations are put on the review queue before the error is
    /// returned. Nothing about them is retried automatically.
    pub async fn apply(&self, outcome: &PaymentOutcome) -> Result<PaymentStatusChange, LedgerError> {
        match self.db.apply_outcome(outcome, &self.policy).await {
            Ok(change) => {
                if change.changed {
                    info!(
                        "🔄️ {} payment {} moved from {} to {}",
                        outcome.provider, outcome.reference, change.previous_status, change.payment.status
                    );
                    self.publish(&change).await;
                } else {
                    debug!("🔄️ {} payment {} is already {}", outcome.provider, outcome.reference, change.payment.status);
                }
                Ok(change)
            },
            Err(e) if e.needs_operator() => {
                error!("🔄️ Could not apply outcome for {} payment {}. {e}", outcome.provider, outcome.reference);
                let source = match &e {
                    LedgerError::Conflict { .. } => ReviewSource::Conflict,
                    LedgerError::AmountMismatch { .. } => ReviewSource::AmountMismatch,
                    _ => ReviewSource::InvariantViolation,
                };
                let payload = serde_json::to_value(outcome).unwrap_or(Value::Null);
                let item = NewReviewItem::new(source, &outcome.reference, &e.to_string()).with_payload(payload);
                if let Err(qe) = self.db.enqueue(item).await {
                    error!("🔄️ Could not queue {} for review either. {qe}", outcome.reference);
                }
                Err(e)
            },
            Err(e) => {
                warn!("🔄️ Could not apply outcome for {} payment {}. {e}", outcome.provider, outcome.reference);
                Err(e)
            },
        }
    }

    async fn publish(&self, change: &PaymentStatusChange) {
        if let Some(earning) = &change.earning {
            for producer in &self.producers.earning_posted_producer {
                debug!("🔄️ Notifying earning posted hook subscribers");
                producer.publish_event(EarningPostedEvent { earning: earning.clone() }).await;
            }
        }
        if matches!(change.payment.status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
            for producer in &self.producers.payment_failed_producer {
                producer.publish_event(PaymentFailedEvent { payment: change.payment.clone() }).await;
            }
        }
    }

    /// Refunds a successful payment and reverses its earning.
    pub async fn refund_payment(
        &self,
        provider: Provider,
        reference: &str,
        reason: &str,
    ) -> Result<(Payment, Option<CreatorEarning>), LedgerError> {
        let (payment, earning) = match self.db.refund_payment(provider, reference, reason).await {
            Ok(refunded) => refunded,
            Err(e) => return Err(queue_violation(&self.db, reference, e).await),
        };
        info!("🔄️ {provider} payment {reference} refunded. {reason}");
        // Repeated refunds are harmless downstream; chargeback flags are keyed on the earning
        if let Some(earning) = earning.as_ref().filter(|e| e.status == EarningStatus::Refunded) {
            for producer in &self.producers.earning_refunded_producer {
                producer.publish_event(EarningRefundedEvent { earning: earning.clone() }).await;
            }
        }
        Ok((payment, earning))
    }

    /// Something went wrong handling a provider callback that nobody will retry. Leave it for an operator.
    pub async fn record_callback_failure(
        &self,
        reference: &str,
        reason: &str,
        payload: Value,
    ) -> Result<(), LedgerError> {
        let item = NewReviewItem::new(ReviewSource::Callback, reference, reason).with_payload(payload);
        self.db.enqueue(item).await?;
        Ok(())
    }

    pub async fn fetch_payment(&self, provider: Provider, reference: &str) -> Result<Payment, LedgerError> {
        self.db
            .fetch_payment_by_reference(provider, reference)
            .await?
            .ok_or_else(|| LedgerError::PaymentNotFound(provider, reference.to_string()))
    }

    pub async fn payments_for_payer(&self, payer_id: &str) -> Result<Vec<Payment>, LedgerError> {
        self.db.fetch_payments_for_payer(payer_id).await
    }

    /// Payments still pending after `older_than`. The reconciliation poller asks the provider about each of them.
    pub async fn stale_payments(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>, LedgerError> {
        self.db.fetch_stale_pending_payments(older_than, limit).await
    }
}
