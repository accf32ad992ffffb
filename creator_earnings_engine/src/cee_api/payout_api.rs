use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use super::{
    review_api::queue_violation,
    risk_rules::{assess, DenialReason, Eligibility, RiskPolicy},
};
use crate::{
    db_types::{CreatorPayout, MinorUnits, NewPayoutRequest},
    events::{EventProducers, PayoutDeniedEvent},
    traits::{LedgerError, PayoutManagement, ReviewQueue},
};

/// Review queue reference for a payout.
pub fn payout_reference(id: i64) -> String {
    format!("payout:{id}")
}

/// The payout risk gate and the payout workflow.
#[derive(Clone)]
pub struct PayoutApi<B> {
    db: B,
    producers: EventProducers,
    policy: RiskPolicy,
    payout_fee: MinorUnits,
}

impl<B> Debug for PayoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi ({:?}, fee {})", self.policy, self.payout_fee)
    }
}

impl<B> PayoutApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, policy: RiskPolicy::default(), payout_fee: MinorUnits::zero() }
    }

    pub fn with_policy(mut self, policy: RiskPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Flat fee deducted from every payout.
    pub fn with_payout_fee(mut self, fee: MinorUnits) -> Self {
        self.payout_fee = fee;
        self
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }
}

impl<B> PayoutApi<B>
where B: PayoutManagement + ReviewQueue
{
    async fn publish_denial(&self, creator_id: &str, amount: MinorUnits, reason: DenialReason) {
        info!("💸️ Payout of {amount} for {creator_id} denied: {}", reason.description());
        for producer in &self.producers.payout_denied_producer {
            let event = PayoutDeniedEvent { creator_id: creator_id.to_string(), amount, reason };
            producer.publish_event(event).await;
        }
    }

    /// Would a payout of `amount` be allowed right now? Nothing is reserved and no denial event is published.
    pub async fn evaluate(&self, creator_id: &str, amount: MinorUnits) -> Result<Eligibility, LedgerError> {
        self.evaluate_at(creator_id, amount, Utc::now()).await
    }

    pub async fn evaluate_at(
        &self,
        creator_id: &str,
        amount: MinorUnits,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidRequest(format!("Payout amount must be positive, not {amount}")));
        }
        let snapshot = self.db.risk_snapshot(creator_id, &self.policy, now).await?;
        Ok(assess(&snapshot, amount, now, &self.policy))
    }

    /// Checks eligibility and creates the payout in one step, reserving the funds and this week's cap.
    pub async fn request_payout(&self, request: NewPayoutRequest) -> Result<CreatorPayout, LedgerError> {
        self.request_payout_at(request, Utc::now()).await
    }

    pub async fn request_payout_at(
        &self,
        request: NewPayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatorPayout, LedgerError> {
        if !request.amount.is_positive() {
            return Err(LedgerError::InvalidRequest(format!("Payout amount must be positive, not {}", request.amount)));
        }
        let creator_id = request.creator_id.clone();
        let amount = request.amount;
        match self.db.create_payout(request, self.payout_fee, &self.policy, now).await {
            Ok(payout) => {
                info!(
                    "💸️ Payout #{} of {} ({} net) requested by {creator_id} to {}",
                    payout.id, payout.amount, payout.net_amount, payout.method
                );
                Ok(payout)
            },
            Err(LedgerError::PayoutDenied(reason)) => {
                self.publish_denial(&creator_id, amount, reason).await;
                Err(LedgerError::PayoutDenied(reason))
            },
            Err(e) => Err(e),
        }
    }

    pub async fn begin_processing(&self, id: i64, reviewer: &str, note: &str) -> Result<CreatorPayout, LedgerError> {
        let payout = self.db.begin_processing(id, reviewer, note).await?;
        info!("💸️ Payout #{id} approved by {reviewer} and is processing");
        Ok(payout)
    }

    pub async fn complete_payout(
        &self,
        id: i64,
        provider_reference: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CreatorPayout, LedgerError> {
        let payout = match self.db.complete_payout(id, provider_reference, provider_txn_id).await {
            Ok(payout) => payout,
            Err(e) => return Err(queue_violation(&self.db, &payout_reference(id), e).await),
        };
        info!("💸️ Payout #{id} completed ({provider_reference})");
        Ok(payout)
    }

    pub async fn fail_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError> {
        let payout = match self.db.fail_payout(id, reason).await {
            Ok(payout) => payout,
            Err(e) => return Err(queue_violation(&self.db, &payout_reference(id), e).await),
        };
        warn!("💸️ Payout #{id} failed. {reason}");
        Ok(payout)
    }

    pub async fn cancel_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError> {
        let payout = match self.db.cancel_payout(id, reason).await {
            Ok(payout) => payout,
            Err(e) => return Err(queue_violation(&self.db, &payout_reference(id), e).await),
        };
        info!("💸️ Payout #{id} cancelled. {reason}");
        Ok(payout)
    }

    pub async fn fetch_payout(&self, id: i64) -> Result<CreatorPayout, LedgerError> {
        self.db.fetch_payout(id).await?.ok_or(LedgerError::PayoutNotFound(id))
    }

    pub async fn payouts_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorPayout>, LedgerError> {
        self.db.fetch_payouts_for_creator(creator_id).await
    }
}
