use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use ceg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use sqlx::types::Json;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------       Provider        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Card and bank payments through Paystack. Supports synchronous verification.
    Paystack,
    /// M-Pesa STK push through Safaricom Daraja. Outcomes arrive by callback.
    Mpesa,
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Paystack => write!(f, "paystack"),
            Provider::Mpesa => write!(f, "mpesa"),
        }
    }
}

impl FromStr for Provider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paystack" => Ok(Self::Paystack),
            "mpesa" => Ok(Self::Mpesa),
            s => Err(ConversionError(format!("Unknown payment provider: {s}"))),
        }
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    /// Only reachable from `Success`.
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Success => write!(f, "success"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub payer_id: String,
    /// The creator who earns from this payment. `None` for platform revenue.
    pub creator_id: Option<String>,
    pub plan_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub provider: Provider,
    pub provider_reference: String,
    pub provider_txn_id: Option<String>,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub payer_id: String,
    pub creator_id: Option<String>,
    pub plan_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub provider: Provider,
    /// Assigned by the provider (or by us, for Paystack) when the charge is initiated.
    pub provider_reference: String,
}

impl NewPayment {
    pub fn new(payer_id: &str, amount: MinorUnits, currency: &str, provider: Provider, reference: &str) -> Self {
        Self {
            payer_id: payer_id.to_string(),
            creator_id: None,
            plan_id: None,
            amount,
            currency: currency.to_string(),
            provider,
            provider_reference: reference.to_string(),
        }
    }

    pub fn with_creator(mut self, creator_id: &str) -> Self {
        self.creator_id = Some(creator_id.to_string());
        self
    }

    pub fn with_plan(mut self, plan_id: &str) -> Self {
        self.plan_id = Some(plan_id.to_string());
        self
    }
}

//--------------------------------------    PaymentOutcome     ---------------------------------------------------------
/// A provider's verdict on a payment, independent of which provider produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub provider: Provider,
    pub reference: String,
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeKind {
    Success {
        provider_txn_id: String,
        /// The amount the provider says was paid, when it says.
        amount: Option<MinorUnits>,
        paid_at: Option<DateTime<Utc>>,
    },
    Failure {
        reason: String,
    },
    Cancelled {
        reason: String,
    },
    Pending,
}

impl PaymentOutcome {
    pub fn success(provider: Provider, reference: &str, provider_txn_id: &str) -> Self {
        let kind =
            OutcomeKind::Success { provider_txn_id: provider_txn_id.to_string(), amount: None, paid_at: None };
        Self { provider, reference: reference.to_string(), kind }
    }

    pub fn failure(provider: Provider, reference: &str, reason: &str) -> Self {
        Self { provider, reference: reference.to_string(), kind: OutcomeKind::Failure { reason: reason.to_string() } }
    }

    pub fn cancelled(provider: Provider, reference: &str, reason: &str) -> Self {
        let kind = OutcomeKind::Cancelled { reason: reason.to_string() };
        Self { provider, reference: reference.to_string(), kind }
    }

    pub fn pending(provider: Provider, reference: &str) -> Self {
        Self { provider, reference: reference.to_string(), kind: OutcomeKind::Pending }
    }

    pub fn with_amount(mut self, value: MinorUnits) -> Self {
        if let OutcomeKind::Success { amount, .. } = &mut self.kind {
            *amount = Some(value);
        }
        self
    }

    pub fn with_paid_at(mut self, at: DateTime<Utc>) -> Self {
        if let OutcomeKind::Success { paid_at, .. } = &mut self.kind {
            *paid_at = Some(at);
        }
        self
    }

    /// The payment status this outcome drives a pending payment to. `None` for `Pending`.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self.kind {
            OutcomeKind::Success { .. } => Some(PaymentStatus::Success),
            OutcomeKind::Failure { .. } => Some(PaymentStatus::Failed),
            OutcomeKind::Cancelled { .. } => Some(PaymentStatus::Cancelled),
            OutcomeKind::Pending => None,
        }
    }
}

//--------------------------------------     EarningStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    Pending,
    Cleared,
    Refunded,
}

impl Display for EarningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarningStatus::Pending => write!(f, "pending"),
            EarningStatus::Cleared => write!(f, "cleared"),
            EarningStatus::Refunded => write!(f, "refunded"),
        }
    }
}

//--------------------------------------    CreatorEarning     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CreatorEarning {
    pub id: i64,
    pub creator_id: String,
    pub payer_id: String,
    pub payment_id: i64,
    pub gross_amount: MinorUnits,
    pub platform_fee: MinorUnits,
    pub net_amount: MinorUnits,
    pub currency: String,
    pub status: EarningStatus,
    pub clears_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    CreatorBalance     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CreatorBalance {
    pub creator_id: String,
    pub available: MinorUnits,
    pub pending: MinorUnits,
    pub locked: MinorUnits,
    pub total_earned: MinorUnits,
    pub total_withdrawn: MinorUnits,
    pub total_refunded: MinorUnits,
    pub first_earning_at: Option<DateTime<Utc>>,
    pub last_earning_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CreatorBalance {
    /// An empty balance, for creators that have never earned anything.
    pub fn empty(creator_id: &str) -> Self {
        Self {
            creator_id: creator_id.to_string(),
            available: MinorUnits::zero(),
            pending: MinorUnits::zero(),
            locked: MinorUnits::zero(),
            total_earned: MinorUnits::zero(),
            total_withdrawn: MinorUnits::zero(),
            total_refunded: MinorUnits::zero(),
            first_earning_at: None,
            last_earning_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> MinorUnits {
        self.available + self.pending + self.locked
    }

    /// The three buckets, without the running totals and timestamps.
    pub fn buckets(&self) -> BalanceBuckets {
        BalanceBuckets { available: self.available, pending: self.pending, locked: self.locked }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBuckets {
    pub available: MinorUnits,
    pub pending: MinorUnits,
    pub locked: MinorUnits,
}

impl Display for BalanceBuckets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "available: {}, pending: {}, locked: {}", self.available, self.pending, self.locked)
    }
}

//--------------------------------------       PayoutCap       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutCap {
    pub id: i64,
    pub creator_id: String,
    /// Whole weeks since activation
    pub week_number: i64,
    pub max_amount: MinorUnits,
    pub used_amount: MinorUnits,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl PayoutCap {
    pub fn remaining(&self) -> MinorUnits {
        self.max_amount - self.used_amount
    }
}

//--------------------------------------     PayoutStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Error)]
#[error("A payout cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: PayoutStatus,
    pub to: PayoutStatus,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed | PayoutStatus::Cancelled)
    }

    /// Validates a status change, returning the new status if it is allowed.
    pub fn transition(self, to: PayoutStatus) -> Result<PayoutStatus, InvalidTransition> {
        use PayoutStatus::*;
        match (self, to) {
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Completed) | (Processing, Failed) => Ok(to),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Processing => write!(f, "processing"),
            PayoutStatus::Completed => write!(f, "completed"),
            PayoutStatus::Failed => write!(f, "failed"),
            PayoutStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

//--------------------------------------     PayoutMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Mpesa,
    Bank,
}

impl Display for PayoutMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutMethod::Mpesa => write!(f, "mpesa"),
            PayoutMethod::Bank => write!(f, "bank"),
        }
    }
}

/// Where the money goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PayoutDestination {
    Mpesa { phone_number: String },
    Bank { bank_name: String, account_number: String, account_name: Option<String> },
}

impl PayoutDestination {
    pub fn method(&self) -> PayoutMethod {
        match self {
            PayoutDestination::Mpesa { .. } => PayoutMethod::Mpesa,
            PayoutDestination::Bank { .. } => PayoutMethod::Bank,
        }
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        match self {
            PayoutDestination::Mpesa { phone_number } => {
                let valid = phone_number.len() == 12
                    && phone_number.starts_with("254")
                    && phone_number.chars().all(|c| c.is_ascii_digit());
                if valid {
                    Ok(())
                } else {
                    Err(ConversionError(format!("{phone_number} is not a valid M-Pesa number (254XXXXXXXXX)")))
                }
            },
            PayoutDestination::Bank { bank_name, account_number, .. } => {
                if bank_name.trim().is_empty() || account_number.trim().is_empty() {
                    Err(ConversionError("Bank payouts need a bank name and account number".into()))
                } else {
                    Ok(())
                }
            },
        }
    }
}

//--------------------------------------     CreatorPayout     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CreatorPayout {
    pub id: i64,
    pub creator_id: String,
    pub amount: MinorUnits,
    pub fee: MinorUnits,
    pub net_amount: MinorUnits,
    pub status: PayoutStatus,
    pub method: PayoutMethod,
    pub destination: Json<PayoutDestination>,
    /// The cap week this payout was counted against. Released if the payout does not complete.
    pub cap_week: i64,
    /// The balance reservation holding the payout amount while it is in flight.
    pub reservation_id: Option<i64>,
    pub provider_reference: Option<String>,
    pub provider_txn_id: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayoutRequest {
    pub creator_id: String,
    pub amount: MinorUnits,
    pub destination: PayoutDestination,
}

impl NewPayoutRequest {
    pub fn new(creator_id: &str, amount: MinorUnits, destination: PayoutDestination) -> Self {
        Self { creator_id: creator_id.to_string(), amount, destination }
    }
}

//--------------------------------------       FraudFlag       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Velocity,
    PriceAnomaly,
    Diversity,
    Chargeback,
    PayoutEdit,
}

impl Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagType::Velocity => write!(f, "velocity"),
            FlagType::PriceAnomaly => write!(f, "price_anomaly"),
            FlagType::Diversity => write!(f, "diversity"),
            FlagType::Chargeback => write!(f, "chargeback"),
            FlagType::PayoutEdit => write!(f, "payout_edit"),
        }
    }
}

impl FromStr for FlagType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "velocity" => Ok(Self::Velocity),
            "price_anomaly" => Ok(Self::PriceAnomaly),
            "diversity" => Ok(Self::Diversity),
            "chargeback" => Ok(Self::Chargeback),
            "payout_edit" => Ok(Self::PayoutEdit),
            s => Err(ConversionError(format!("Unknown flag type: {s}"))),
        }
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FlagSeverity {
    /// Open flags at this severity or above block payouts.
    pub fn blocks_payouts(&self) -> bool {
        *self >= FlagSeverity::High
    }
}

impl Display for FlagSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagSeverity::Low => write!(f, "low"),
            FlagSeverity::Medium => write!(f, "medium"),
            FlagSeverity::High => write!(f, "high"),
            FlagSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    Open,
    Reviewed,
    Cleared,
    Confirmed,
}

impl Display for FlagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagStatus::Open => write!(f, "open"),
            FlagStatus::Reviewed => write!(f, "reviewed"),
            FlagStatus::Cleared => write!(f, "cleared"),
            FlagStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct FraudFlag {
    pub id: i64,
    pub creator_id: String,
    pub flag_type: FlagType,
    pub severity: FlagSeverity,
    pub score: i64,
    pub status: FlagStatus,
    pub details: Json<Value>,
    /// Suppresses duplicate flags for the same signal. Released for some flag types when the flag closes.
    pub dedup_key: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    pub auto_cleared: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFraudFlag {
    pub creator_id: String,
    pub flag_type: FlagType,
    pub severity: FlagSeverity,
    pub score: i64,
    pub details: Value,
    pub dedup_key: Option<String>,
    /// When the flag was raised. `None` means the time of insertion.
    pub raised_at: Option<DateTime<Utc>>,
    /// The flag is dropped if a flag of the same type was raised for the creator after this time.
    pub quiet_since: Option<DateTime<Utc>>,
}

//--------------------------------------        Creator        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Creator {
    pub creator_id: String,
    pub subscription_price: MinorUnits,
    pub activated_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspend_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Creator {
    pub fn is_suspended(&self) -> bool {
        self.suspended_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub plan_id: String,
    pub creator_id: String,
    pub price: MinorUnits,
    pub currency: String,
    /// The platform's cut, in basis points
    pub platform_fee_bps: i64,
}

//--------------------------------------      ReviewItem       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    /// A provider callback that parsed but could not be applied.
    Callback,
    /// A terminal payment received a contradicting outcome.
    Conflict,
    /// The provider reported a different amount than was charged.
    AmountMismatch,
    /// Stored balances disagree with the replayed ledger.
    InvariantViolation,
    /// The reconciliation poller could not settle a payment.
    Poller,
}

impl Display for ReviewSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewSource::Callback => write!(f, "callback"),
            ReviewSource::Conflict => write!(f, "conflict"),
            ReviewSource::AmountMismatch => write!(f, "amount_mismatch"),
            ReviewSource::InvariantViolation => write!(f, "invariant_violation"),
            ReviewSource::Poller => write!(f, "poller"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: i64,
    pub source: ReviewSource,
    pub reference: String,
    pub reason: String,
    pub payload: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReviewItem {
    pub source: ReviewSource,
    pub reference: String,
    pub reason: String,
    pub payload: Option<Value>,
}

impl NewReviewItem {
    pub fn new(source: ReviewSource, reference: &str, reason: &str) -> Self {
        Self { source, reference: reference.to_string(), reason: reason.to_string(), payload: None }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
