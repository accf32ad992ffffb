use chrono::{DateTime, Utc};

use crate::{
    db_types::{BalanceBuckets, CreatorBalance, CreatorEarning, MinorUnits},
    traits::{data_objects::ReservationToken, LedgerError, LedgerPolicy},
};

/// The earnings ledger owns creator balances. Nothing else writes to them.
///
/// Every balance mutation happens in a transaction whose first statement takes the write lock, so operations on a
/// creator's balance never interleave.
#[allow(async_fn_in_trait)]
pub trait EarningsLedger: Clone {
    /// Posts the earning for a successful payment. Posting the same payment twice returns the original posting.
    async fn post_earning(&self, payment_id: i64, policy: &LedgerPolicy) -> Result<CreatorEarning, LedgerError>;

    async fn fetch_earning(&self, id: i64) -> Result<Option<CreatorEarning>, LedgerError>;

    /// Most recent first.
    async fn fetch_earnings_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorEarning>, LedgerError>;

    /// Pending earnings whose clearing time has passed, oldest first.
    async fn fetch_due_earnings(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<CreatorEarning>, LedgerError>;

    /// Moves a due earning from pending to available. Returns `None` if it had already been cleared.
    async fn clear_earning(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CreatorEarning>, LedgerError>;

    /// Reverses a pending or cleared earning from whichever bucket holds it. Never clamps: if the bucket cannot cover
    /// the reversal, [`LedgerError::LedgerInvariantViolation`] is returned and nothing changes.
    async fn refund_earning(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<CreatorEarning, LedgerError>;

    /// The stored balance. Creators that have never earned get an empty balance.
    async fn fetch_balance(&self, creator_id: &str) -> Result<CreatorBalance, LedgerError>;

    /// Moves `amount` from available to locked, or fails with [`LedgerError::InsufficientFunds`].
    async fn reserve(&self, creator_id: &str, amount: MinorUnits) -> Result<ReservationToken, LedgerError>;

    /// Removes the reserved funds from locked and counts them as withdrawn.
    async fn commit_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError>;

    /// Returns the reserved funds to available.
    async fn release_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError>;

    /// Rebuilds the balance buckets from the earning and payout records.
    async fn derive_balance(&self, creator_id: &str) -> Result<BalanceBuckets, LedgerError>;
}
