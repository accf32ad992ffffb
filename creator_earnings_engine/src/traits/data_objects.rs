use ceg_common::BASIS_POINTS_DENOMINATOR;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::db_types::{Creator, CreatorEarning, MinorUnits, Payment, PaymentStatus};

pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 1_000;
pub const DEFAULT_CLEARING_DELAY_DAYS: i64 = 7;

/// How earnings are split and when they clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Platform cut for payments that are not tied to a registered plan
    pub default_fee_bps: u32,
    pub clearing_delay: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self { default_fee_bps: DEFAULT_PLATFORM_FEE_BPS, clearing_delay: Duration::days(DEFAULT_CLEARING_DELAY_DAYS) }
    }
}

/// Gross, fee and net for one posting. `gross == fee + net` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: MinorUnits,
    pub fee: MinorUnits,
    pub net: MinorUnits,
}

impl FeeSplit {
    pub fn new(gross: MinorUnits, fee_bps: u32) -> Self {
        let bps = i64::from(fee_bps).min(BASIS_POINTS_DENOMINATOR) as u32;
        let fee = gross.basis_points(bps);
        Self { gross, fee, net: gross - fee }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChange {
    pub payment: Payment,
    pub previous_status: PaymentStatus,
    /// False when the outcome had already been applied
    pub changed: bool,
    /// The posting created by this change, if any
    pub earning: Option<CreatorEarning>,
}

impl PaymentStatusChange {
    pub fn unchanged(payment: Payment) -> Self {
        let previous_status = payment.status;
        Self { payment, previous_status, changed: false, earning: None }
    }
}

/// A hold on part of a creator's available balance. It has to be either committed or released, and can be used only
/// once.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct ReservationToken {
    id: i64,
    creator_id: String,
    amount: MinorUnits,
}

impl ReservationToken {
    pub(crate) fn new(id: i64, creator_id: &str, amount: MinorUnits) -> Self {
        Self { id, creator_id: creator_id.to_string(), amount }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn amount(&self) -> MinorUnits {
        self.amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorUpdate {
    pub creator: Creator,
    /// The price before this update. `None` for new creators.
    pub previous_price: Option<MinorUnits>,
}

impl CreatorUpdate {
    pub fn price_changed(&self) -> bool {
        self.previous_price != Some(self.creator.subscription_price)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    pub cleared: Vec<CreatorEarning>,
    pub failed: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fee_split() {
        let split = FeeSplit::new(MinorUnits::from(50_000), 1_000);
        assert_eq!(split.fee, MinorUnits::from(5_000));
        assert_eq!(split.net, MinorUnits::from(45_000));
        // rounding favours the creator
        let split = FeeSplit::new(MinorUnits::from(999), 1_000);
        assert_eq!(split.fee, MinorUnits::from(99));
        assert_eq!(split.net, MinorUnits::from(900));
        assert_eq!(split.fee + split.net, split.gross);
        let split = FeeSplit::new(MinorUnits::from(1_000), 20_000);
        assert_eq!(split.net, MinorUnits::zero());
    }
}
