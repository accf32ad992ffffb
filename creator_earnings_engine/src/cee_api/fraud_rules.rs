//! Fraud heuristics.
//!
//! Each check takes the numbers it needs and returns the flag it would raise, if any. None of them touch the
//! database; [`crate::FraudApi`] gathers the inputs and stores the results.
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde_json::json;

use crate::db_types::{CreatorEarning, FlagSeverity, FlagType, MinorUnits, NewFraudFlag};

/// Earnings within this window count towards the velocity check.
pub fn velocity_window() -> Duration {
    Duration::hours(1)
}
pub const VELOCITY_THRESHOLD: i64 = 10;
pub const PRICE_ANOMALY_MULTIPLIER: i64 = 3;
pub const PRICE_ANOMALY_SCORE: i64 = 50;
pub const DIVERSITY_MIN_EARNINGS: i64 = 10;
pub const DIVERSITY_MIN_PAYERS: i64 = 5;
pub const DIVERSITY_SCORE: i64 = 40;
pub const MANUAL_FLAG_SCORE: i64 = 70;
/// Used as the platform median when there are no priced creators yet. 500.00 in the plan currency.
pub const DEFAULT_MEDIAN_PRICE: i64 = 50_000;

/// The epoch-aligned hour containing `now`.
pub fn hour_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now)
}

pub fn velocity_dedup_key(creator_id: &str, now: DateTime<Utc>) -> String {
    format!("{creator_id}:velocity:{}", hour_window_start(now).timestamp())
}

/// Key for flag types that may only have one open flag at a time. The key is released when the flag closes.
pub fn open_flag_dedup_key(creator_id: &str, flag_type: FlagType) -> String {
    format!("{creator_id}:{flag_type}:open")
}

pub fn chargeback_dedup_key(creator_id: &str, earning_id: i64) -> String {
    format!("{creator_id}:chargeback:{earning_id}")
}

/// `recent_earnings` is the number of earnings posted for the creator in the last [`velocity_window`].
pub fn check_velocity(creator_id: &str, recent_earnings: i64, now: DateTime<Utc>) -> Option<NewFraudFlag> {
    if recent_earnings < VELOCITY_THRESHOLD {
        return None;
    }
    Some(NewFraudFlag {
        creator_id: creator_id.to_string(),
        flag_type: FlagType::Velocity,
        severity: FlagSeverity::High,
        score: recent_earnings * 10,
        details: json!({
            "earnings_in_window": recent_earnings,
            "window_minutes": velocity_window().num_minutes(),
            "window_start": hour_window_start(now),
        }),
        dedup_key: Some(velocity_dedup_key(creator_id, now)),
        raised_at: Some(now),
        quiet_since: Some(now - velocity_window()),
    })
}

pub fn check_price_anomaly(creator_id: &str, price: MinorUnits, median: MinorUnits) -> Option<NewFraudFlag> {
    if price <= median * PRICE_ANOMALY_MULTIPLIER {
        return None;
    }
    Some(NewFraudFlag {
        creator_id: creator_id.to_string(),
        flag_type: FlagType::PriceAnomaly,
        severity: FlagSeverity::Medium,
        score: PRICE_ANOMALY_SCORE,
        details: json!({
            "price": price,
            "median_price": median,
            "multiplier": PRICE_ANOMALY_MULTIPLIER,
        }),
        dedup_key: Some(open_flag_dedup_key(creator_id, FlagType::PriceAnomaly)),
        raised_at: None,
        quiet_since: None,
    })
}

pub fn check_diversity(creator_id: &str, total_earnings: i64, distinct_payers: i64) -> Option<NewFraudFlag> {
    if total_earnings <= DIVERSITY_MIN_EARNINGS || distinct_payers >= DIVERSITY_MIN_PAYERS {
        return None;
    }
    Some(NewFraudFlag {
        creator_id: creator_id.to_string(),
        flag_type: FlagType::Diversity,
        severity: FlagSeverity::Medium,
        score: DIVERSITY_SCORE,
        details: json!({
            "total_earnings": total_earnings,
            "distinct_payers": distinct_payers,
        }),
        dedup_key: Some(open_flag_dedup_key(creator_id, FlagType::Diversity)),
        raised_at: None,
        quiet_since: None,
    })
}

pub fn chargeback_flag(earning: &CreatorEarning) -> NewFraudFlag {
    NewFraudFlag {
        creator_id: earning.creator_id.clone(),
        flag_type: FlagType::Chargeback,
        severity: FlagSeverity::High,
        score: MANUAL_FLAG_SCORE,
        details: json!({
            "earning_id": earning.id,
            "payment_id": earning.payment_id,
            "net_amount": earning.net_amount,
            "reason": earning.refund_reason,
        }),
        dedup_key: Some(chargeback_dedup_key(&earning.creator_id, earning.id)),
        raised_at: None,
        quiet_since: None,
    }
}

pub fn manual_flag(creator_id: &str, flag_type: FlagType, reason: &str, now: DateTime<Utc>) -> NewFraudFlag {
    NewFraudFlag {
        creator_id: creator_id.to_string(),
        flag_type,
        severity: FlagSeverity::High,
        score: MANUAL_FLAG_SCORE,
        details: json!({ "reason": reason, "flagged_at": now }),
        dedup_key: None,
        raised_at: None,
        quiet_since: None,
    }
}

/// The median of `prices`, or [`DEFAULT_MEDIAN_PRICE`] when there is nothing to go on. Even-sized sets average the
/// two middle values, rounding down.
pub fn median_price(mut prices: Vec<MinorUnits>) -> MinorUnits {
    if prices.is_empty() {
        return MinorUnits::from(DEFAULT_MEDIAN_PRICE);
    }
    prices.sort();
    let mid = prices.len() / 2;
    if prices.len() % 2 == 0 {
        MinorUnits::from((prices[mid - 1].value() + prices[mid].value()) / 2)
    } else {
        prices[mid]
    }
}
