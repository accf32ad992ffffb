use chrono::{DateTime, Utc};

use crate::{
    db_types::{FlagStatus, FlagType, FraudFlag, MinorUnits, NewFraudFlag},
    traits::LedgerError,
};

/// Storage for fraud signals and the data the heuristics run on.
#[allow(async_fn_in_trait)]
pub trait FraudManagement: Clone {
    /// Number of earnings posted for the creator since `since`, refunded ones included.
    async fn count_earnings_since(&self, creator_id: &str, since: DateTime<Utc>) -> Result<i64, LedgerError>;

    /// `(total earnings, distinct payers)` for the creator.
    async fn payer_diversity(&self, creator_id: &str) -> Result<(i64, i64), LedgerError>;

    /// Subscription prices of all priced creators.
    async fn subscription_prices(&self) -> Result<Vec<MinorUnits>, LedgerError>;

    /// Stores a flag. Returns `None` when a flag with the same dedup key already exists.
    async fn insert_flag(&self, flag: NewFraudFlag) -> Result<Option<FraudFlag>, LedgerError>;

    /// Closes every open flag of the given type for the creator as `cleared` by the system.
    async fn auto_clear_flags(
        &self,
        creator_id: &str,
        flag_type: FlagType,
        note: &str,
    ) -> Result<Vec<FraudFlag>, LedgerError>;

    /// Closes an open flag. Fails with [`LedgerError::FlagAlreadyClosed`] if the flag is not open.
    async fn review_flag(
        &self,
        id: i64,
        status: FlagStatus,
        reviewer: &str,
        note: &str,
    ) -> Result<FraudFlag, LedgerError>;

    async fn fetch_flag(&self, id: i64) -> Result<Option<FraudFlag>, LedgerError>;

    /// Open flags for the creator, most severe first, then newest first.
    async fn fetch_open_flags(&self, creator_id: &str) -> Result<Vec<FraudFlag>, LedgerError>;

    /// Open flags across all creators, in the same order as [`Self::fetch_open_flags`].
    async fn fetch_all_open_flags(&self) -> Result<Vec<FraudFlag>, LedgerError>;
}
