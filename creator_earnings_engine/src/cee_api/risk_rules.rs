//! Payout eligibility rules.
//!
//! Everything in this module is a pure function of a [`RiskSnapshot`], the requested amount, the current time and a
//! [`RiskPolicy`]. Loading the snapshot (and holding the creator's balance lock while doing so) is the backend's job.
use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Creator, MinorUnits, PayoutCap};

pub const DEFAULT_FIRST_PAYOUT_DELAY_DAYS: i64 = 7;
pub const DEFAULT_CAP_WEEK_LENGTH_DAYS: i64 = 7;
/// 20,000.00 in the plan currency
pub const DEFAULT_LOW_CAP: i64 = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    AccountSuspended,
    NotActivated,
    FirstPayoutDelay,
    UnderReview,
    InsufficientFunds,
    CapExceeded,
}

impl DenialReason {
    /// Stable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::AccountSuspended => "account_suspended",
            DenialReason::NotActivated => "not_activated",
            DenialReason::FirstPayoutDelay => "first_payout_delay",
            DenialReason::UnderReview => "under_review",
            DenialReason::InsufficientFunds => "insufficient_funds",
            DenialReason::CapExceeded => "cap_exceeded",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DenialReason::AccountSuspended => "This account has been suspended",
            DenialReason::NotActivated => "This account has not been activated for payouts yet",
            DenialReason::FirstPayoutDelay => "Payouts open once the account has been active for a week",
            DenialReason::UnderReview => "This account is under review",
            DenialReason::InsufficientFunds => "The requested amount exceeds the available balance",
            DenialReason::CapExceeded => "The requested amount exceeds this week's payout limit",
        }
    }
}

impl Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskPolicy {
    pub first_payout_delay: Duration,
    pub cap_week_length: Duration,
    /// Weeks 0 and 1
    pub low_cap: MinorUnits,
    /// Weeks 2 and 3
    pub mid_cap: MinorUnits,
    /// Week 4 onwards
    pub high_cap: MinorUnits,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::with_low_cap(MinorUnits::from(DEFAULT_LOW_CAP))
    }
}

impl RiskPolicy {
    /// The default policy, with the mid and high caps scaled from `low_cap` (2.5x and 50x).
    pub fn with_low_cap(low_cap: MinorUnits) -> Self {
        Self {
            first_payout_delay: Duration::days(DEFAULT_FIRST_PAYOUT_DELAY_DAYS),
            cap_week_length: Duration::days(DEFAULT_CAP_WEEK_LENGTH_DAYS),
            low_cap,
            mid_cap: MinorUnits::from(low_cap.value() * 5 / 2),
            high_cap: low_cap * 50,
        }
    }

    /// Whole cap-weeks elapsed since activation. Never negative.
    pub fn week_index(&self, activated_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let len = self.cap_week_length.num_seconds().max(1);
        ((now - activated_at).num_seconds() / len).max(0)
    }

    pub fn cap_for_week(&self, week: i64) -> MinorUnits {
        match week {
            i64::MIN..=1 => self.low_cap,
            2..=3 => self.mid_cap,
            _ => self.high_cap,
        }
    }

    pub fn cap_window(&self, activated_at: DateTime<Utc>, week: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = activated_at + self.cap_week_length * week as i32;
        (start, start + self.cap_week_length)
    }

    /// The cap window that `now` falls in, with nothing used.
    pub fn current_window(&self, activated_at: DateTime<Utc>, now: DateTime<Utc>) -> CapWindow {
        let week = self.week_index(activated_at, now);
        let (starts_at, ends_at) = self.cap_window(activated_at, week);
        CapWindow { week, max_amount: self.cap_for_week(week), used_amount: MinorUnits::zero(), starts_at, ends_at }
    }
}

/// The payout cap for one activation week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapWindow {
    pub week: i64,
    pub max_amount: MinorUnits,
    pub used_amount: MinorUnits,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl CapWindow {
    pub fn remaining(&self) -> MinorUnits {
        let remaining = self.max_amount - self.used_amount;
        if remaining.is_negative() {
            MinorUnits::zero()
        } else {
            remaining
        }
    }
}

impl From<PayoutCap> for CapWindow {
    fn from(cap: PayoutCap) -> Self {
        Self {
            week: cap.week_number,
            max_amount: cap.max_amount,
            used_amount: cap.used_amount,
            starts_at: cap.window_start,
            ends_at: cap.window_end,
        }
    }
}

/// Everything the gate needs to know about a creator at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub creator_id: String,
    pub creator: Option<Creator>,
    pub available: MinorUnits,
    /// Open flags with severity high or critical
    pub blocking_flags: i64,
    /// The materialized cap row for the current week, if any payout has been made against it
    pub current_cap: Option<PayoutCap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible { cap: CapWindow },
    Denied { reason: DenialReason },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Eligibility::Eligible { .. } => None,
            Eligibility::Denied { reason } => Some(*reason),
        }
    }
}

fn deny(reason: DenialReason) -> Eligibility {
    Eligibility::Denied { reason }
}

/// Decides whether `amount` may be paid out. Checks run in a fixed order and the first failure wins.
pub fn assess(snapshot: &RiskSnapshot, amount: MinorUnits, now: DateTime<Utc>, policy: &RiskPolicy) -> Eligibility {
    let creator = match &snapshot.creator {
        Some(c) => c,
        None => return deny(DenialReason::NotActivated),
    };
    if creator.is_suspended() {
        return deny(DenialReason::AccountSuspended);
    }
    let activated_at = match creator.activated_at {
        Some(t) if t <= now => t,
        _ => return deny(DenialReason::NotActivated),
    };
    if now - activated_at < policy.first_payout_delay {
        return deny(DenialReason::FirstPayoutDelay);
    }
    if snapshot.blocking_flags > 0 {
        return deny(DenialReason::UnderReview);
    }
    if amount > snapshot.available {
        return deny(DenialReason::InsufficientFunds);
    }
    let mut cap = policy.current_window(activated_at, now);
    if let Some(row) = snapshot.current_cap.as_ref().filter(|c| c.week_number == cap.week) {
        cap = CapWindow::from(row.clone());
    }
    if amount > cap.remaining() {
        return deny(DenialReason::CapExceeded);
    }
    Eligibility::Eligible { cap }
}
