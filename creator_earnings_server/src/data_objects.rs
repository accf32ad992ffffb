use std::fmt::Display;

use ceg_common::MinorUnits;
use creator_earnings_engine::{
    db_types::{CreatorBalance, FlagStatus, FlagType, PayoutDestination},
    CapWindow,
    Eligibility,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//--------------------------------------   Payment initiation   --------------------------------------------------------

/// Starts a Paystack checkout for a subscription. The payer is taken from the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackInitializeRequest {
    pub email: String,
    pub amount: MinorUnits,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub creator_id: Option<String>,
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackInitializeResponse {
    pub payment_id: i64,
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushRequest {
    /// 254XXXXXXXXX
    pub phone_number: String,
    /// Minor units. Must be a whole number of shillings.
    pub amount: MinorUnits,
    pub creator_id: Option<String>,
    pub plan_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushResponse {
    pub payment_id: i64,
    pub checkout_request_id: String,
    pub customer_message: String,
}

fn default_currency() -> String {
    "NGN".to_string()
}

//--------------------------------------       Creators       ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    #[serde(flatten)]
    pub balance: CreatorBalance,
    pub total: MinorUnits,
}

impl From<CreatorBalance> for BalanceResponse {
    fn from(balance: CreatorBalance) -> Self {
        let total = balance.total();
        Self { balance, total }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequestBody {
    pub amount: MinorUnits,
    pub destination: PayoutDestination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityQuery {
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    /// Stable denial code, e.g. `insufficient_funds`
    pub reason: Option<String>,
    pub message: Option<String>,
    pub cap: Option<CapWindow>,
}

impl From<Eligibility> for EligibilityResponse {
    fn from(value: Eligibility) -> Self {
        match value {
            Eligibility::Eligible { cap } => Self { eligible: true, reason: None, message: None, cap: Some(cap) },
            Eligibility::Denied { reason } => Self {
                eligible: false,
                reason: Some(reason.code().to_string()),
                message: Some(reason.description().to_string()),
                cap: None,
            },
        }
    }
}

//--------------------------------------         Admin         --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertCreatorRequest {
    pub creator_id: String,
    pub subscription_price: MinorUnits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivateCreatorRequest {
    /// Defaults to now
    pub activated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlanRequest {
    pub plan_id: String,
    pub creator_id: String,
    pub price: MinorUnits,
    pub currency: String,
    pub platform_fee_bps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualFlagRequest {
    pub creator_id: String,
    pub flag_type: FlagType,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagReviewRequest {
    pub status: FlagStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePayoutRequest {
    pub provider_reference: String,
    pub provider_txn_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPaymentRequest {
    pub provider: creator_earnings_engine::db_types::Provider,
    pub reference: String,
    pub reason: String,
}
