use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use creator_earnings_engine::{
    db_types::{CreatorBalance, MinorUnits, PayoutDestination},
    events::EventProducers,
    test_utils::{drop_database, prepare_test_env, random_db_path},
    CreatorApi,
    LedgerApi,
    PayoutApi,
    SqliteDatabase,
};
use serde_json::Value;

use super::helpers::{get_request, issue_token, post_request, valid_token};
use crate::{
    auth::Role,
    data_objects::PayoutRequestBody,
    endpoint_tests::mocks::MockLedgerBackend,
    routes::{MyBalanceRoute, PayoutEligibilityRoute, RequestPayoutRoute},
};

#[actix_web::test]
async fn fetch_my_balance_no_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/api/balance", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided."), "{body}");
}

#[actix_web::test]
async fn fetch_my_balance_garbage_token() {
    let _ = env_logger::try_init().ok();
    let (status, _) = get_request("not-a-jwt", "/api/balance", configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn fetch_my_balance_expired_token() {
    let _ = env_logger::try_init().ok();
    let token = issue_token("alice", &[Role::Creator], Utc::now() - Duration::days(1));
    let (status, body) = get_request(&token, "/api/balance", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Access token is invalid"), "{body}");
}

#[actix_web::test]
async fn fetch_my_balance_as_reader() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("bob", &[Role::User]);
    let (status, body) = get_request(&token, "/api/balance", configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Insufficient Permissions"), "{body}");
}

#[actix_web::test]
async fn fetch_my_balance() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("alice", &[Role::Creator]);
    let (status, body) = get_request(&token, "/api/balance", configure).await;
    assert_eq!(status, StatusCode::OK);
    let balance: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(balance["creator_id"], "alice");
    assert_eq!(balance["available"], 45_000);
    assert_eq!(balance["pending"], 9_000);
    assert_eq!(balance["locked"], 10_000);
    assert_eq!(balance["total"], 64_000);
}

fn configure(cfg: &mut ServiceConfig) {
    let mut ledger = MockLedgerBackend::new();
    ledger.expect_fetch_balance().withf(|creator_id| creator_id == "alice").returning(|creator_id| {
        let mut balance = CreatorBalance::empty(creator_id);
        balance.available = MinorUnits::from(45_000);
        balance.pending = MinorUnits::from(9_000);
        balance.locked = MinorUnits::from(10_000);
        balance.total_earned = MinorUnits::from(64_000);
        Ok(balance)
    });
    let api = LedgerApi::new(ledger, EventProducers::default());
    cfg.service(MyBalanceRoute::<MockLedgerBackend>::new()).app_data(web::Data::new(api));
}

fn configure_payouts(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = PayoutApi::new(db, EventProducers::default());
        cfg.service(RequestPayoutRoute::<SqliteDatabase>::new())
            .service(PayoutEligibilityRoute::<SqliteDatabase>::new())
            .app_data(web::Data::new(api));
    }
}

#[actix_web::test]
async fn payout_for_unknown_creator_is_denied() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let token = valid_token("carol", &[Role::Creator]);
    let body = PayoutRequestBody {
        amount: MinorUnits::from(10_000),
        destination: PayoutDestination::Mpesa { phone_number: "254712345678".into() },
    };
    let (status, body) = post_request(&token, "/api/payouts", &body, configure_payouts(db.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(err["reason"], "not_activated");

    db.close().await;
    drop_database(&url).await;
}

#[actix_web::test]
async fn eligibility_reports_the_denial_reason() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let creators = CreatorApi::new(db.clone(), EventProducers::default());
    creators.upsert_creator("alice", MinorUnits::from(50_000)).await.unwrap();
    creators.activate_creator("alice", Some(Utc::now() - Duration::days(30))).await.unwrap();

    let token = valid_token("alice", &[Role::Creator]);
    let (status, body) = get_request(&token, "/api/payouts/eligibility?amount=10000", configure_payouts(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let eligibility: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(eligibility["eligible"], false);
    assert_eq!(eligibility["reason"], "insufficient_funds");

    db.close().await;
    drop_database(&url).await;
}

#[actix_web::test]
async fn payouts_are_for_creators_only() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let token = valid_token("bob", &[Role::User]);
    let (status, _) = get_request(&token, "/api/payouts/eligibility?amount=100", configure_payouts(db.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    db.close().await;
    drop_database(&url).await;
}
