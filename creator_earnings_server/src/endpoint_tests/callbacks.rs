use actix_web::{http::StatusCode, web, web::ServiceConfig};
use ceg_common::Secret;
use chrono::Utc;
use creator_earnings_engine::{
    db_types::{
        MinorUnits,
        NewReviewItem,
        OutcomeKind,
        Payment,
        PaymentOutcome,
        PaymentStatus,
        Provider,
        ReviewItem,
        ReviewSource,
    },
    events::EventProducers,
    traits::{LedgerError, PaymentStatusChange},
    ReconcilerApi,
};
use provider_tools::helpers::paystack_signature;
use serde_json::{json, Value};

use super::{helpers::callback_request, mocks::MockReconcilerBackend};
use crate::{
    middleware::HmacMiddlewareFactory,
    provider_routes::{MpesaCallbackRoute, PaystackCallbackRoute},
};

const PAYSTACK_SECRET: &str = "sk_test_endpoint_tests_only";

fn payment(provider: Provider, reference: &str, status: PaymentStatus) -> Payment {
    let now = Utc::now();
    Payment {
        id: 1,
        payer_id: "reader".into(),
        creator_id: Some("alice".into()),
        plan_id: None,
        amount: MinorUnits::from(15_000),
        currency: "KES".into(),
        provider,
        provider_reference: reference.into(),
        provider_txn_id: None,
        status,
        failure_reason: None,
        paid_at: None,
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn review_item(item: &NewReviewItem) -> ReviewItem {
    ReviewItem {
        id: 1,
        source: item.source,
        reference: item.reference.clone(),
        reason: item.reason.clone(),
        payload: None,
        created_at: Utc::now(),
        resolved_at: None,
        resolved_by: None,
        resolution_note: None,
    }
}

fn mpesa_callback(checkout_request_id: &str, result_code: i64) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": result_code,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 150.00 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "PhoneNumber", "Value": 254708374149u64 }
                    ]
                }
            }
        }
    })
}

fn mount(backend: MockReconcilerBackend, cfg: &mut ServiceConfig) {
    let api = ReconcilerApi::new(backend, EventProducers::default());
    cfg.app_data(web::Data::new(api)).service(
        web::scope("/callbacks")
            .service(web::scope("/mpesa").service(MpesaCallbackRoute::<MockReconcilerBackend>::new()))
            .service(
                web::scope("/paystack")
                    .wrap(HmacMiddlewareFactory::paystack(Secret::new(PAYSTACK_SECRET.to_string()), true))
                    .service(PaystackCallbackRoute::<MockReconcilerBackend>::new()),
            ),
    );
}

#[actix_web::test]
async fn successful_mpesa_callback_settles_the_payment() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut backend = MockReconcilerBackend::new();
        backend
            .expect_apply_outcome()
            .withf(|outcome, _| {
                outcome.reference == "ws_CO_1"
                    && matches!(&outcome.kind, OutcomeKind::Success { provider_txn_id, amount: Some(a), .. }
                        if provider_txn_id == "NLJ7RT61SV" && *a == MinorUnits::from(15_000))
            })
            .times(1)
            .returning(|outcome, _| {
                Ok(PaymentStatusChange {
                    payment: payment(outcome.provider, &outcome.reference, PaymentStatus::Success),
                    previous_status: PaymentStatus::Pending,
                    changed: true,
                    earning: None,
                })
            });
        backend.expect_enqueue().never();
        mount(backend, cfg);
    };
    let (status, body) = callback_request("/callbacks/mpesa", &mpesa_callback("ws_CO_1", 0), &[], configure).await;
    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(ack["ResultCode"], 0);
}

#[actix_web::test]
async fn mpesa_callback_for_unknown_payment_is_queued_and_acknowledged() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut backend = MockReconcilerBackend::new();
        backend
            .expect_apply_outcome()
            .returning(|outcome, _| Err(LedgerError::PaymentNotFound(outcome.provider, outcome.reference.clone())));
        backend
            .expect_enqueue()
            .withf(|item| item.source == ReviewSource::Callback && item.reference == "ws_CO_missing")
            .times(1)
            .returning(|item| Ok(review_item(&item)));
        mount(backend, cfg);
    };
    let callback = mpesa_callback("ws_CO_missing", 0);
    let (status, body) = callback_request("/callbacks/mpesa", &callback, &[], configure).await;
    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(ack["ResultCode"], 0);
}

#[actix_web::test]
async fn conflicting_callback_is_queued_once() {
    let _ = env_logger::try_init().ok();
    let configure = |cfg: &mut ServiceConfig| {
        let mut backend = MockReconcilerBackend::new();
        backend.expect_apply_outcome().returning(|outcome, _| {
            Err(LedgerError::Conflict {
                reference: outcome.reference.clone(),
                current: PaymentStatus::Cancelled,
                attempted: PaymentStatus::Success,
            })
        });
        backend
            .expect_enqueue()
            .withf(|item| item.source == ReviewSource::Conflict)
            .times(1)
            .returning(|item| Ok(review_item(&item)));
        mount(backend, cfg);
    };
    let (status, _) = callback_request("/callbacks/mpesa", &mpesa_callback("ws_CO_2", 0), &[], configure).await;
    assert_eq!(status, StatusCode::OK);
}

fn charge_success(reference: &str) -> Value {
    json!({
        "event": "charge.success",
        "data": {
            "id": 302961,
            "status": "success",
            "reference": reference,
            "amount": 500000,
            "currency": "NGN",
            "gateway_response": "Approved",
            "paid_at": "2024-06-01T10:15:00Z"
        }
    })
}

fn paystack_configure(cfg: &mut ServiceConfig) {
    let mut backend = MockReconcilerBackend::new();
    backend
        .expect_apply_outcome()
        .withf(|outcome, _| outcome.provider == Provider::Paystack && outcome.reference == "PAY_abc_1")
        .returning(|outcome: &PaymentOutcome, _| {
            Ok(PaymentStatusChange {
                payment: payment(outcome.provider, &outcome.reference, PaymentStatus::Success),
                previous_status: PaymentStatus::Pending,
                changed: true,
                earning: None,
            })
        });
    mount(backend, cfg);
}

#[actix_web::test]
async fn paystack_callback_with_valid_signature() {
    let _ = env_logger::try_init().ok();
    let event = charge_success("PAY_abc_1");
    let signature = paystack_signature(PAYSTACK_SECRET, event.to_string().as_bytes());
    let headers = [("x-paystack-signature", signature.as_str())];
    let (status, body) = callback_request("/callbacks/paystack", &event, &headers, paystack_configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[actix_web::test]
async fn paystack_callback_with_forged_signature() {
    let _ = env_logger::try_init().ok();
    let event = charge_success("PAY_abc_1");
    let signature = paystack_signature("not-the-secret", event.to_string().as_bytes());
    let headers = [("x-paystack-signature", signature.as_str())];
    let (status, _) = callback_request("/callbacks/paystack", &event, &headers, paystack_configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn paystack_callback_without_signature() {
    let _ = env_logger::try_init().ok();
    let event = charge_success("PAY_abc_1");
    let (status, _) = callback_request("/callbacks/paystack", &event, &[], paystack_configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
