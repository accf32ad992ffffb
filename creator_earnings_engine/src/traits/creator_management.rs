use chrono::{DateTime, Utc};

use crate::{
    db_types::{Creator, MinorUnits, SubscriptionPlan},
    traits::{data_objects::CreatorUpdate, LedgerError},
};

#[allow(async_fn_in_trait)]
pub trait CreatorManagement: Clone {
    /// Creates the creator, or updates the subscription price of an existing one.
    async fn upsert_creator(&self, creator_id: &str, subscription_price: MinorUnits)
        -> Result<CreatorUpdate, LedgerError>;

    async fn fetch_creator(&self, creator_id: &str) -> Result<Option<Creator>, LedgerError>;

    /// Marks the creator as activated. If they already were, the earlier activation time is kept.
    async fn activate_creator(&self, creator_id: &str, at: DateTime<Utc>) -> Result<Creator, LedgerError>;

    async fn suspend_creator(&self, creator_id: &str, reason: &str) -> Result<Creator, LedgerError>;

    async fn unsuspend_creator(&self, creator_id: &str) -> Result<Creator, LedgerError>;

    /// Creates or replaces a plan.
    async fn register_plan(&self, plan: SubscriptionPlan) -> Result<SubscriptionPlan, LedgerError>;

    async fn fetch_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, LedgerError>;
}
