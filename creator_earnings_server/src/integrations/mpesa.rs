use ceg_common::MinorUnits;
use creator_earnings_engine::db_types::{PaymentOutcome, Provider};
use provider_tools::{StkCallback, StkQueryResponse, MPESA_RESULT_CANCELLED_BY_USER, MPESA_RESULT_SUCCESS};

pub const DEFAULT_TRANSACTION_DESC: &str = "Newsletter Subscription";

/// Maps an STK push callback onto an outcome. The checkout request id is the payment reference.
pub fn outcome_from_callback(callback: &StkCallback) -> PaymentOutcome {
    let reference = callback.checkout_request_id.as_str();
    match callback.result_code() {
        Some(MPESA_RESULT_SUCCESS) => {
            let receipt = callback.receipt_number().unwrap_or_else(|| callback.merchant_request_id.clone());
            let outcome = PaymentOutcome::success(Provider::Mpesa, reference, &receipt);
            match callback.amount_minor() {
                Some(minor) => outcome.with_amount(MinorUnits::from(minor)),
                None => outcome,
            }
        },
        Some(MPESA_RESULT_CANCELLED_BY_USER) => {
            PaymentOutcome::cancelled(Provider::Mpesa, reference, &callback.result_desc)
        },
        Some(_) => PaymentOutcome::failure(Provider::Mpesa, reference, &callback.result_desc),
        None => PaymentOutcome::failure(
            Provider::Mpesa,
            reference,
            &format!("Unrecognised result code {}. {}", callback.result_code, callback.result_desc),
        ),
    }
}

/// Maps an STK status query onto an outcome. Queries don't carry the receipt number, so the checkout request id
/// stands in for the transaction id. A missing result code means the customer hasn't answered yet.
pub fn outcome_from_query(checkout_request_id: &str, response: &StkQueryResponse) -> PaymentOutcome {
    match response.result_code() {
        Some(MPESA_RESULT_SUCCESS) => PaymentOutcome::success(Provider::Mpesa, checkout_request_id, checkout_request_id),
        Some(MPESA_RESULT_CANCELLED_BY_USER) => {
            PaymentOutcome::cancelled(Provider::Mpesa, checkout_request_id, &response.result_desc)
        },
        Some(_) => PaymentOutcome::failure(Provider::Mpesa, checkout_request_id, &response.result_desc),
        None => PaymentOutcome::pending(Provider::Mpesa, checkout_request_id),
    }
}

/// Daraja only takes numbers in the form 254XXXXXXXXX.
pub fn is_valid_msisdn(phone_number: &str) -> bool {
    phone_number.len() == 12 && phone_number.starts_with("254") && phone_number.chars().all(|c| c.is_ascii_digit())
}
