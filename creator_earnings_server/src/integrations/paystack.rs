use ceg_common::MinorUnits;
use creator_earnings_engine::db_types::{PaymentOutcome, Provider};
use log::*;
use provider_tools::{PaystackTransaction, PaystackTransactionState, PaystackWebhookEvent};

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const CHARGE_FAILED: &str = "charge.failed";

/// Maps a verified (or webhook-delivered) transaction onto an outcome for the reconciler.
pub fn outcome_from_transaction(tx: &PaystackTransaction) -> PaymentOutcome {
    let reference = tx.reference.as_str();
    match tx.state() {
        PaystackTransactionState::Success => {
            let outcome = PaymentOutcome::success(Provider::Paystack, reference, &tx.id.to_string())
                .with_amount(MinorUnits::from(tx.amount));
            match tx.paid_at {
                Some(at) => outcome.with_paid_at(at),
                None => outcome,
            }
        },
        PaystackTransactionState::Failed => PaymentOutcome::failure(Provider::Paystack, reference, &tx.failure_reason()),
        PaystackTransactionState::Abandoned => {
            PaymentOutcome::cancelled(Provider::Paystack, reference, &tx.failure_reason())
        },
        // A reversal of a settled charge contradicts a successful payment, so it ends up with an operator
        PaystackTransactionState::Reversed => {
            PaymentOutcome::failure(Provider::Paystack, reference, &tx.failure_reason())
        },
        PaystackTransactionState::InProgress => PaymentOutcome::pending(Provider::Paystack, reference),
    }
}

/// Returns `Ok(None)` for events that don't concern a charge. Those are acknowledged and otherwise ignored.
pub fn outcome_from_webhook(event: &PaystackWebhookEvent) -> Result<Option<PaymentOutcome>, serde_json::Error> {
    match event.event.as_str() {
        CHARGE_SUCCESS => {
            let tx = event.transaction()?;
            Ok(Some(outcome_from_transaction(&tx)))
        },
        CHARGE_FAILED => {
            let tx = event.transaction()?;
            Ok(Some(PaymentOutcome::failure(Provider::Paystack, &tx.reference, &tx.failure_reason())))
        },
        other => {
            debug!("💻️ Ignoring Paystack event {other}");
            Ok(None)
        },
    }
}
