use chrono::{DateTime, Utc};

use crate::{
    cee_api::risk_rules::{RiskPolicy, RiskSnapshot},
    db_types::{CreatorPayout, MinorUnits, NewPayoutRequest},
    traits::LedgerError,
};

/// Backend behaviour for the payout workflow.
///
/// States: `pending → processing → completed | failed`, and `pending → cancelled`.
#[allow(async_fn_in_trait)]
pub trait PayoutManagement: Clone {
    /// Loads what the risk gate needs to evaluate a payout for the creator at `now`.
    async fn risk_snapshot(
        &self,
        creator_id: &str,
        policy: &RiskPolicy,
        now: DateTime<Utc>,
    ) -> Result<RiskSnapshot, LedgerError>;

    /// Creates a payout in one transaction: lock the balance, evaluate the risk gate, reserve the funds, consume the
    /// week's cap and store the payout. A denial is returned as [`LedgerError::PayoutDenied`] and changes nothing.
    async fn create_payout(
        &self,
        request: NewPayoutRequest,
        fee: MinorUnits,
        policy: &RiskPolicy,
        now: DateTime<Utc>,
    ) -> Result<CreatorPayout, LedgerError>;

    async fn fetch_payout(&self, id: i64) -> Result<Option<CreatorPayout>, LedgerError>;

    /// Most recent first.
    async fn fetch_payouts_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorPayout>, LedgerError>;

    /// `pending → processing`, recording who approved it.
    async fn begin_processing(&self, id: i64, reviewer: &str, note: &str) -> Result<CreatorPayout, LedgerError>;

    /// `processing → completed`. The reservation is committed and counted as withdrawn.
    async fn complete_payout(
        &self,
        id: i64,
        provider_reference: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CreatorPayout, LedgerError>;

    /// `processing → failed`. The reservation and the consumed cap are released.
    async fn fail_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError>;

    /// `pending → cancelled`. The reservation and the consumed cap are released.
    async fn cancel_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError>;
}
