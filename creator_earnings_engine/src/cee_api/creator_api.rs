use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Creator, MinorUnits, SubscriptionPlan},
    events::{CreatorPriceChangedEvent, EventProducers},
    traits::{CreatorManagement, LedgerError},
};

/// Creator registration, activation, suspension and plans.
#[derive(Clone)]
pub struct CreatorApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for CreatorApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CreatorApi")
    }
}

impl<B> CreatorApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> CreatorApi<B>
where B: CreatorManagement
{
    pub async fn upsert_creator(&self, creator_id: &str, subscription_price: MinorUnits) -> Result<Creator, LedgerError> {
        let update = self.db.upsert_creator(creator_id, subscription_price).await?;
        if update.price_changed() {
            debug!("🪪️ {creator_id} now charges {subscription_price} (was {:?})", update.previous_price);
            for producer in &self.producers.creator_price_changed_producer {
                let event = CreatorPriceChangedEvent {
                    creator_id: creator_id.to_string(),
                    old_price: update.previous_price,
                    new_price: subscription_price,
                };
                producer.publish_event(event).await;
            }
        }
        Ok(update.creator)
    }

    pub async fn fetch_creator(&self, creator_id: &str) -> Result<Creator, LedgerError> {
        self.db.fetch_creator(creator_id).await?.ok_or_else(|| LedgerError::CreatorNotFound(creator_id.to_string()))
    }

    /// Activates the creator at `at`, or now. An earlier activation is never moved later.
    pub async fn activate_creator(&self, creator_id: &str, at: Option<DateTime<Utc>>) -> Result<Creator, LedgerError> {
        let creator = self.db.activate_creator(creator_id, at.unwrap_or_else(Utc::now)).await?;
        info!("🪪️ {creator_id} activated as of {:?}", creator.activated_at);
        Ok(creator)
    }

    pub async fn suspend_creator(&self, creator_id: &str, reason: &str) -> Result<Creator, LedgerError> {
        let creator = self.db.suspend_creator(creator_id, reason).await?;
        warn!("🪪️ {creator_id} suspended. {reason}");
        Ok(creator)
    }

    pub async fn unsuspend_creator(&self, creator_id: &str) -> Result<Creator, LedgerError> {
        let creator = self.db.unsuspend_creator(creator_id).await?;
        info!("🪪️ {creator_id} is no longer suspended");
        Ok(creator)
    }

    pub async fn register_plan(&self, plan: SubscriptionPlan) -> Result<SubscriptionPlan, LedgerError> {
        let plan = self.db.register_plan(plan).await?;
        debug!("🪪️ Plan {} registered for {} at {} bps", plan.plan_id, plan.creator_id, plan.platform_fee_bps);
        Ok(plan)
    }

    pub async fn fetch_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, LedgerError> {
        self.db.fetch_plan(plan_id).await
    }
}
