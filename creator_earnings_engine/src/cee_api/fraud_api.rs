use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use super::fraud_rules::{
    chargeback_flag,
    check_diversity,
    check_price_anomaly,
    check_velocity,
    manual_flag,
    median_price,
    velocity_window,
};
use crate::{
    db_types::{CreatorEarning, FlagStatus, FlagType, FraudFlag, MinorUnits, NewFraudFlag},
    events::{EventProducers, FlagRaisedEvent},
    traits::{FraudManagement, LedgerError},
};

/// Runs the fraud heuristics and manages the flags they raise.
///
/// The checks are triggered by ledger events (see [`fraud_event_hooks`]) and never run inside a ledger transaction.
/// A failing check is logged and otherwise ignored; it cannot undo the posting that triggered it.
#[derive(Clone)]
pub struct FraudApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for FraudApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FraudApi")
    }
}

impl<B> FraudApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> FraudApi<B>
where B: FraudManagement
{
    /// Stores the flag and announces it. Returns `None` if an equivalent flag already exists.
    async fn raise(&self, flag: NewFraudFlag) -> Result<Option<FraudFlag>, LedgerError> {
        let flag = self.db.insert_flag(flag).await?;
        if let Some(flag) = &flag {
            warn!(
                "🚩️ {} flag #{} raised for {} (severity {}, score {})",
                flag.flag_type, flag.id, flag.creator_id, flag.severity, flag.score
            );
            for producer in &self.producers.flag_raised_producer {
                producer.publish_event(FlagRaisedEvent { flag: flag.clone() }).await;
            }
        }
        Ok(flag)
    }

    pub async fn check_velocity(&self, creator_id: &str, now: DateTime<Utc>) -> Result<Option<FraudFlag>, LedgerError> {
        let recent = self.db.count_earnings_since(creator_id, now - velocity_window()).await?;
        trace!("🚩️ {creator_id} has {recent} earnings in the last hour");
        match check_velocity(creator_id, recent, now) {
            Some(flag) => self.raise(flag).await,
            None => Ok(None),
        }
    }

    /// Flags creators whose earnings come from very few payers. Clears an open diversity flag when the creator no
    /// longer trips the check.
    pub async fn check_diversity(&self, creator_id: &str) -> Result<Option<FraudFlag>, LedgerError> {
        let (total, distinct) = self.db.payer_diversity(creator_id).await?;
        match check_diversity(creator_id, total, distinct) {
            Some(flag) => self.raise(flag).await,
            None => {
                self.auto_clear(creator_id, FlagType::Diversity).await?;
                Ok(None)
            },
        }
    }

    /// Compares the price to the platform median. Clears an open price anomaly flag when the price is back in line.
    pub async fn check_price_anomaly(
        &self,
        creator_id: &str,
        price: MinorUnits,
    ) -> Result<Option<FraudFlag>, LedgerError> {
        let median = median_price(self.db.subscription_prices().await?);
        trace!("🚩️ Platform median price is {median}. {creator_id} charges {price}");
        match check_price_anomaly(creator_id, price, median) {
            Some(flag) => self.raise(flag).await,
            None => {
                self.auto_clear(creator_id, FlagType::PriceAnomaly).await?;
                Ok(None)
            },
        }
    }

    async fn auto_clear(&self, creator_id: &str, flag_type: FlagType) -> Result<(), LedgerError> {
        let cleared = self.db.auto_clear_flags(creator_id, flag_type, "Check no longer triggers").await?;
        for flag in cleared {
            info!("🚩️ {flag_type} flag #{} for {creator_id} cleared automatically", flag.id);
        }
        Ok(())
    }

    /// The checks that run whenever an earning is posted.
    pub async fn on_earning_posted(&self, earning: &CreatorEarning) {
        let creator_id = earning.creator_id.as_str();
        if let Err(e) = self.check_velocity(creator_id, earning.created_at).await {
            error!("🚩️ Velocity check for {creator_id} failed. {e}");
        }
        if let Err(e) = self.check_diversity(creator_id).await {
            error!("🚩️ Diversity check for {creator_id} failed. {e}");
        }
    }

    pub async fn raise_chargeback(&self, earning: &CreatorEarning) -> Result<Option<FraudFlag>, LedgerError> {
        self.raise(chargeback_flag(earning)).await
    }

    /// Manual flag raised by an operator.
    pub async fn flag_for_review(
        &self,
        creator_id: &str,
        flag_type: FlagType,
        reason: &str,
    ) -> Result<FraudFlag, LedgerError> {
        let flag = manual_flag(creator_id, flag_type, reason, Utc::now());
        self.raise(flag)
            .await?
            .ok_or_else(|| LedgerError::DatabaseError("A flag without a dedup key was deduplicated".to_string()))
    }

    pub async fn review_flag(
        &self,
        id: i64,
        status: FlagStatus,
        reviewer: &str,
        note: &str,
    ) -> Result<FraudFlag, LedgerError> {
        let flag = self.db.review_flag(id, status, reviewer, note).await?;
        info!("🚩️ Flag #{id} for {} marked {status} by {reviewer}", flag.creator_id);
        Ok(flag)
    }

    pub async fn fetch_flag(&self, id: i64) -> Result<FraudFlag, LedgerError> {
        self.db.fetch_flag(id).await?.ok_or(LedgerError::FlagNotFound(id))
    }

    pub async fn open_flags(&self, creator_id: &str) -> Result<Vec<FraudFlag>, LedgerError> {
        self.db.fetch_open_flags(creator_id).await
    }

    pub async fn all_open_flags(&self) -> Result<Vec<FraudFlag>, LedgerError> {
        self.db.fetch_all_open_flags().await
    }
}

/// Subscribes the fraud checks to the ledger events that trigger them:
///
/// * `EarningPosted` runs the velocity and diversity checks.
/// * `EarningRefunded` raises a chargeback flag.
/// * `CreatorPriceChanged` runs the price anomaly check.
#[cfg(feature = "sqlite")]
pub fn fraud_event_hooks(api: FraudApi<crate::SqliteDatabase>) -> crate::events::EventHooks {
    let mut hooks = crate::events::EventHooks::default();
    let posted_api = api.clone();
    hooks.on_earning_posted(move |ev| {
        let api = posted_api.clone();
        Box::pin(async move {
            api.on_earning_posted(&ev.earning).await;
        })
    });
    let refunded_api = api.clone();
    hooks.on_earning_refunded(move |ev| {
        let api = refunded_api.clone();
        Box::pin(async move {
            if let Err(e) = api.raise_chargeback(&ev.earning).await {
                error!("🚩️ Could not raise a chargeback flag for earning #{}. {e}", ev.earning.id);
            }
        })
    });
    hooks.on_creator_price_changed(move |ev| {
        let api = api.clone();
        Box::pin(async move {
            if let Err(e) = api.check_price_anomaly(&ev.creator_id, ev.new_price).await {
                error!("🚩️ Price anomaly check for {} failed. {e}", ev.creator_id);
            }
        })
    });
    hooks
}
