use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use creator_earnings_engine::{
    db_types::{MinorUnits, Payment, PaymentStatus, Provider},
    events::EventProducers,
    ReconcilerApi,
};
use provider_tools::{MpesaApi, MpesaConfig, PaystackApi, PaystackConfig};
use serde_json::{json, Value};

use super::{
    helpers::{get_request, post_request, valid_token},
    mocks::MockReconcilerBackend,
};
use crate::{
    auth::Role,
    provider_routes::{MpesaStkPushRoute, MyPaymentsRoute, PaystackInitializeRoute, PaystackVerifyRoute},
};

fn payment(payer_id: &str, reference: &str, status: PaymentStatus) -> Payment {
    let now = Utc::now();
    Payment {
        id: 12,
        payer_id: payer_id.into(),
        creator_id: Some("alice".into()),
        plan_id: Some("alice-monthly".into()),
        amount: MinorUnits::from(500_000),
        currency: "NGN".into(),
        provider: Provider::Paystack,
        provider_reference: reference.into(),
        provider_txn_id: (status == PaymentStatus::Success).then(|| "302961".to_string()),
        status,
        failure_reason: None,
        paid_at: (status == PaymentStatus::Success).then_some(now),
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Provider clients are left unconfigured, so any call that reaches a provider fails.
fn configure(cfg: &mut ServiceConfig) {
    let mut backend = MockReconcilerBackend::new();
    backend
        .expect_fetch_payment_by_reference()
        .withf(|provider, reference| *provider == Provider::Paystack && reference == "PAY_done")
        .returning(|_, reference| Ok(Some(payment("reader", reference, PaymentStatus::Success))));
    backend
        .expect_fetch_payment_by_reference()
        .withf(|_, reference| reference == "PAY_missing")
        .returning(|_, _| Ok(None));
    backend
        .expect_fetch_payments_for_payer()
        .withf(|payer_id| payer_id == "reader")
        .returning(|payer_id| Ok(vec![payment(payer_id, "PAY_done", PaymentStatus::Success)]));
    backend.expect_insert_payment().never();
    let api = ReconcilerApi::new(backend, EventProducers::default());
    let paystack = PaystackApi::new(PaystackConfig::default()).unwrap();
    let mpesa = MpesaApi::new(MpesaConfig::default()).unwrap();
    cfg.service(MyPaymentsRoute::<MockReconcilerBackend>::new())
        .service(PaystackInitializeRoute::<MockReconcilerBackend>::new())
        .service(PaystackVerifyRoute::<MockReconcilerBackend>::new())
        .service(MpesaStkPushRoute::<MockReconcilerBackend>::new())
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(paystack))
        .app_data(web::Data::new(mpesa));
}

#[actix_web::test]
async fn fetch_my_payments() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("reader", &[Role::User]);
    let (status, body) = get_request(&token, "/api/payments", configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let payments: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["provider_reference"], "PAY_done");
    assert_eq!(payments[0]["status"], "success");
}

#[actix_web::test]
async fn paystack_checkout_without_credentials() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("reader", &[Role::User]);
    let body = json!({ "email": "reader@example.com", "amount": 500000, "creator_id": "alice" });
    let (status, body) = post_request(&token, "/api/payments/paystack/initialize", &body, configure).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("Paystack is not configured"), "{body}");
}

#[actix_web::test]
async fn stk_push_without_credentials() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("reader", &[Role::User]);
    let body = json!({ "phone_number": "254708374149", "amount": 15000, "creator_id": "alice" });
    let (status, body) = post_request(&token, "/api/payments/mpesa/stkpush", &body, configure).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("M-Pesa is not configured"), "{body}");
}

#[actix_web::test]
async fn verify_settled_payment_skips_the_provider() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("reader", &[Role::User]);
    let (status, body) = get_request(&token, "/api/payments/paystack/verify/PAY_done", configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let payment: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(payment["status"], "success");
    assert_eq!(payment["provider_txn_id"], "302961");
}

#[actix_web::test]
async fn verify_someone_elses_payment() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("eve", &[Role::User]);
    let (status, _) = get_request(&token, "/api/payments/paystack/verify/PAY_done", configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admins_can_verify_any_payment() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("ops", &[Role::Admin]);
    let (status, _) = get_request(&token, "/api/payments/paystack/verify/PAY_done", configure).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn verify_unknown_payment() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("reader", &[Role::User]);
    let (status, _) = get_request(&token, "/api/payments/paystack/verify/PAY_missing", configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
