use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;

use super::review_api::queue_violation;
use crate::{
    db_types::{CreatorBalance, CreatorEarning, MinorUnits, NewReviewItem, ReviewSource},
    events::{EarningClearedEvent, EarningPostedEvent, EarningRefundedEvent, EventProducers},
    traits::{EarningsLedger, LedgerError, LedgerPolicy, ReservationToken, ReviewQueue, SweepResult},
};

/// The earnings ledger. Posting normally happens through [`crate::ReconcilerApi`]; this API covers clearing, refunds,
/// balances and the reservation primitives.
#[derive(Clone)]
pub struct LedgerApi<B> {
    db: B,
    producers: EventProducers,
    policy: LedgerPolicy,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.policy)
    }
}

/// Review queue reference for an earning.
pub fn earning_reference(id: i64) -> String {
    format!("earning:{id}")
}

impl<B> LedgerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, policy: LedgerPolicy::default() }
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<B> LedgerApi<B>
where B: EarningsLedger + ReviewQueue
{
    /// Posts the earning for a successful payment that was not posted when it succeeded. Posting twice returns the
    /// existing earning.
    pub async fn post_earning(&self, payment_id: i64) -> Result<CreatorEarning, LedgerError> {
        let earning = self.db.post_earning(payment_id, &self.policy).await?;
        for producer in &self.producers.earning_posted_producer {
            producer.publish_event(EarningPostedEvent { earning: earning.clone() }).await;
        }
        Ok(earning)
    }

    /// Clears up to `limit` due earnings, each in its own transaction. One failure does not stop the sweep.
    pub async fn clear_due_earnings(&self, now: DateTime<Utc>, limit: i64) -> Result<SweepResult, LedgerError> {
        let due = self.db.fetch_due_earnings(now, limit).await?;
        let mut result = SweepResult::default();
        for earning in due {
            match self.db.clear_earning(earning.id, now).await {
                Ok(Some(cleared)) => {
                    for producer in &self.producers.earning_cleared_producer {
                        producer.publish_event(EarningClearedEvent { earning: cleared.clone() }).await;
                    }
                    result.cleared.push(cleared);
                },
                Ok(None) => trace!("📒️ Earning #{} was cleared by someone else", earning.id),
                Err(e) => {
                    let e = queue_violation(&self.db, &earning_reference(earning.id), e).await;
                    warn!("📒️ Could not clear earning #{}. {e}", earning.id);
                    result.failed += 1;
                },
            }
        }
        if !result.cleared.is_empty() || result.failed > 0 {
            info!("📒️ Clearing sweep: {} cleared, {} failed", result.cleared.len(), result.failed);
        }
        Ok(result)
    }

    /// Clears a single earning. Returns `None` if it had already cleared.
    pub async fn clear_earning(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CreatorEarning>, LedgerError> {
        let cleared = match self.db.clear_earning(id, now).await {
            Ok(cleared) => cleared,
            Err(e) => return Err(queue_violation(&self.db, &earning_reference(id), e).await),
        };
        if let Some(earning) = &cleared {
            for producer in &self.producers.earning_cleared_producer {
                producer.publish_event(EarningClearedEvent { earning: earning.clone() }).await;
            }
        }
        Ok(cleared)
    }

    pub async fn refund_earning(&self, id: i64, reason: &str) -> Result<CreatorEarning, LedgerError> {
        let earning = match self.db.refund_earning(id, reason, Utc::now()).await {
            Ok(earning) => earning,
            Err(e) => return Err(queue_violation(&self.db, &earning_reference(id), e).await),
        };
        info!("📒️ Earning #{id} for {} refunded. {reason}", earning.creator_id);
        for producer in &self.producers.earning_refunded_producer {
            producer.publish_event(EarningRefundedEvent { earning: earning.clone() }).await;
        }
        Ok(earning)
    }

    pub async fn balance(&self, creator_id: &str) -> Result<CreatorBalance, LedgerError> {
        self.db.fetch_balance(creator_id).await
    }

    pub async fn earnings(&self, creator_id: &str) -> Result<Vec<CreatorEarning>, LedgerError> {
        self.db.fetch_earnings_for_creator(creator_id).await
    }

    pub async fn earning(&self, id: i64) -> Result<CreatorEarning, LedgerError> {
        self.db.fetch_earning(id).await?.ok_or(LedgerError::EarningNotFound(id))
    }

    /// Replays the creator's earnings and payouts and checks that the stored balance agrees. A mismatch is queued for
    /// review.
    pub async fn verify_balance(&self, creator_id: &str) -> Result<CreatorBalance, LedgerError> {
        let stored = self.db.fetch_balance(creator_id).await?;
        let derived = self.db.derive_balance(creator_id).await?;
        if stored.buckets() == derived {
            debug!("📒️ Balance for {creator_id} verified: {derived}");
            return Ok(stored);
        }
        let reason = format!("Stored balance {} does not match replayed balance {derived}", stored.buckets());
        error!("📒️ {creator_id}: {reason}");
        let payload = json!({ "stored": stored.buckets(), "derived": derived });
        let item = NewReviewItem::new(ReviewSource::InvariantViolation, creator_id, &reason).with_payload(payload);
        if let Err(e) = self.db.enqueue(item).await {
            error!("📒️ Could not queue the balance mismatch for {creator_id}. {e}");
        }
        Err(LedgerError::LedgerInvariantViolation(reason))
    }

    pub async fn reserve(&self, creator_id: &str, amount: MinorUnits) -> Result<ReservationToken, LedgerError> {
        self.db.reserve(creator_id, amount).await
    }

    pub async fn commit(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError> {
        self.db.commit_reservation(token).await
    }

    pub async fn release(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError> {
        self.db.release_reservation(token).await
    }
}
