use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//-------------------------------------------------  Paystack  ---------------------------------------------------------

/// Every Paystack response is wrapped in this envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEnvelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units (kobo, pesewas, cents)
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaystackCustomer {
    #[serde(default)]
    pub email: Option<String>,
}

/// A transaction as returned by `/transaction/verify` and inside `charge.*` webhook events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackTransaction {
    pub id: i64,
    /// `success`, `failed`, `abandoned`, `reversed`, `ongoing`, `pending`, ...
    pub status: String,
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default, alias = "paidAt")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer: Option<PaystackCustomer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaystackTransactionState {
    Success,
    Failed,
    /// Customer walked away from checkout.
    Abandoned,
    /// Money was returned to the customer after settlement.
    Reversed,
    /// Anything still in flight.
    InProgress,
}

impl PaystackTransaction {
    pub fn state(&self) -> PaystackTransactionState {
        match self.status.as_str() {
            "success" => PaystackTransactionState::Success,
            "failed" => PaystackTransactionState::Failed,
            "abandoned" => PaystackTransactionState::Abandoned,
            "reversed" => PaystackTransactionState::Reversed,
            _ => PaystackTransactionState::InProgress,
        }
    }

    pub fn failure_reason(&self) -> String {
        self.gateway_response.clone().unwrap_or_else(|| format!("Transaction {}", self.status))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackWebhookEvent {
    pub event: String,
    pub data: Value,
}

impl PaystackWebhookEvent {
    /// The transaction carried by `charge.*` events. Other events carry different payloads.
    pub fn transaction(&self) -> Result<PaystackTransaction, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

//-------------------------------------------------   M-Pesa   ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MpesaAuthResponse {
    pub access_token: String,
    /// Seconds, sent as a string.
    pub expires_in: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    /// Whole shillings
    pub amount: i64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub call_back_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushResponse {
    pub fn accepted(&self) -> bool {
        self.response_code.trim() == "0"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    /// Daraja sends this as a string on query responses and as a number on callbacks.
    #[serde(rename = "ResultCode", default)]
    pub result_code: Value,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
}

impl StkQueryResponse {
    pub fn result_code(&self) -> Option<i64> {
        code_from_value(&self.result_code)
    }
}

/// Result codes that matter to the ledger.
pub const MPESA_RESULT_SUCCESS: i64 = 0;
pub const MPESA_RESULT_CANCELLED_BY_USER: i64 = 1032;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: MpesaCallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: Value,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default, skip_serializing_if = "Option::is_none")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    pub fn result_code(&self) -> Option<i64> {
        code_from_value(&self.result_code)
    }

    fn metadata(&self, name: &str) -> Option<&Value> {
        self.callback_metadata.as_ref()?.item.iter().find(|i| i.name == name).and_then(|i| i.value.as_ref())
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.metadata("MpesaReceiptNumber").and_then(|v| v.as_str()).map(String::from)
    }

    /// The amount paid, in hundredths of a shilling. Daraja sends whole shillings, sometimes written as `150.00`.
    /// Fractions are kept so that an odd amount shows up as a mismatch instead of being rounded away.
    pub fn amount_minor(&self) -> Option<i64> {
        self.metadata("Amount").and_then(minor_from_value)
    }

    pub fn phone_number(&self) -> Option<String> {
        self.metadata("PhoneNumber").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// The acknowledgement Daraja expects from a callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl MpesaAck {
    pub fn accepted() -> Self {
        Self { result_code: 0, result_desc: "Accepted".to_string() }
    }
}

/// Whole numbers only. `0.0` is 0, but `0.5` is not a code.
fn code_from_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A major-unit amount in hundredths. Anything finer than a hundredth is rejected.
fn minor_from_value(v: &Value) -> Option<i64> {
    let major = match v {
        Value::Number(n) => match n.as_i64() {
            Some(whole) => return whole.checked_mul(100),
            None => n.as_f64()?,
        },
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let scaled = major * 100.0;
    let minor = scaled.round();
    if (scaled - minor).abs() > 1e-6 {
        return None;
    }
    integral(minor)
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}
