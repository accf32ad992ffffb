//! Background jobs. Do not await the returned JoinHandles, as they run indefinitely.
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use creator_earnings_engine::{
    db_types::{NewReviewItem, Payment, PaymentOutcome, Provider, ReviewSource},
    events::EventProducers,
    LedgerApi,
    LedgerPolicy,
    ReconcilerApi,
    ReviewApi,
    SqliteDatabase,
};
use log::*;
use provider_tools::{MpesaApi, PaystackApi, ProviderApiError};
use tokio::task::JoinHandle;

use crate::integrations::{mpesa::outcome_from_query, paystack::outcome_from_transaction};

const CLEARING_BATCH_SIZE: i64 = 500;
const RECONCILIATION_BATCH_SIZE: i64 = 100;
/// Pending payments that still cannot be settled after this long are cancelled and handed to an operator.
pub const RECONCILIATION_GIVE_UP_AGE: Duration = Duration::hours(24);

/// Starts the clearing sweep, which moves earnings past their clearing date from `pending` to `available`.
pub fn start_clearing_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    policy: LedgerPolicy,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = LedgerApi::new(db, producers).with_policy(policy);
        info!("🕰️ Clearing worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running clearing sweep");
            match api.clear_due_earnings(Utc::now(), CLEARING_BATCH_SIZE).await {
                Ok(result) => {
                    if !result.cleared.is_empty() {
                        info!("🕰️ {} earnings cleared", result.cleared.len());
                    }
                    if result.failed > 0 {
                        warn!("🕰️ {} earnings could not be cleared", result.failed);
                    }
                },
                Err(e) => error!("🕰️ Error running clearing sweep: {e}"),
            }
        }
    })
}

/// Settles payments whose callback never arrived, by asking the provider directly.
#[derive(Clone)]
pub struct ReconciliationPoller {
    reconciler: ReconcilerApi<SqliteDatabase>,
    review: ReviewApi<SqliteDatabase>,
    paystack: PaystackApi,
    mpesa: MpesaApi,
    stale_after: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollResult {
    pub checked: usize,
    pub settled: usize,
    pub skipped: usize,
    pub abandoned: usize,
}

impl ReconciliationPoller {
    pub fn new(
        reconciler: ReconcilerApi<SqliteDatabase>,
        review: ReviewApi<SqliteDatabase>,
        paystack: PaystackApi,
        mpesa: MpesaApi,
        stale_after: Duration,
    ) -> Self {
        Self { reconciler, review, paystack, mpesa, stale_after }
    }

    pub async fn poll(&self) -> PollResult {
        let now = Utc::now();
        let mut result = PollResult::default();
        let stale = match self.reconciler.stale_payments(now - self.stale_after, RECONCILIATION_BATCH_SIZE).await {
            Ok(payments) => payments,
            Err(e) => {
                error!("🕰️ Could not fetch stale payments. {e}");
                return result;
            },
        };
        for payment in stale {
            result.checked += 1;
            match self.outcome_for(&payment).await {
                Ok(Some(outcome)) if outcome.target_status().is_some() => {
                    match self.reconciler.apply(&outcome).await {
                        Ok(_) => result.settled += 1,
                        Err(e) => warn!("🕰️ Could not settle payment #{}. {e}", payment.id),
                    }
                },
                Ok(_) => {
                    trace!("🕰️ Payment #{} is still in progress", payment.id);
                    result.skipped += 1;
                },
                Err(e) if e.is_transient() || matches!(e, ProviderApiError::Unavailable(_)) => {
                    debug!("🕰️ Provider unavailable for payment #{}. Will try again. {e}", payment.id);
                    result.skipped += 1;
                },
                Err(e) if now - payment.created_at > RECONCILIATION_GIVE_UP_AGE => {
                    self.abandon(&payment, &e).await;
                    result.abandoned += 1;
                },
                Err(e) => {
                    warn!("🕰️ Could not check payment #{} with {}. {e}", payment.id, payment.provider);
                    result.skipped += 1;
                },
            }
        }
        result
    }

    /// `Ok(None)` when the provider is not configured on this server.
    async fn outcome_for(&self, payment: &Payment) -> Result<Option<PaymentOutcome>, ProviderApiError> {
        let reference = payment.provider_reference.as_str();
        match payment.provider {
            Provider::Paystack if self.paystack.is_configured() => {
                let tx = self.paystack.verify_transaction(reference).await?;
                Ok(Some(outcome_from_transaction(&tx)))
            },
            Provider::Mpesa if self.mpesa.is_configured() => {
                let response = self.mpesa.query_stk_status(reference).await?;
                Ok(Some(outcome_from_query(reference, &response)))
            },
            _ => Ok(None),
        }
    }

    async fn abandon(&self, payment: &Payment, e: &ProviderApiError) {
        let reason = format!("No outcome from {} after {} hours. {e}", payment.provider, RECONCILIATION_GIVE_UP_AGE.num_hours());
        warn!("🕰️ Giving up on payment #{}. {reason}", payment.id);
        let outcome = PaymentOutcome::cancelled(payment.provider, &payment.provider_reference, &reason);
        if let Err(le) = self.reconciler.apply(&outcome).await {
            error!("🕰️ Could not cancel payment #{}. {le}", payment.id);
        }
        let item = NewReviewItem::new(ReviewSource::Poller, &payment.provider_reference, &reason);
        if let Err(le) = self.review.enqueue(item).await {
            error!("🕰️ Could not queue payment #{} for review. {le}", payment.id);
        }
    }
}

pub fn start_reconciliation_worker(poller: ReconciliationPoller, interval: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Reconciliation worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running reconciliation poll");
            let result = poller.poll().await;
            if result.checked > 0 {
                info!(
                    "🕰️ Reconciliation: {} stale payments checked, {} settled, {} abandoned",
                    result.checked, result.settled, result.abandoned
                );
            }
        }
    })
}
