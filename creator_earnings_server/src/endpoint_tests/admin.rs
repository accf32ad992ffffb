use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use creator_earnings_engine::{
    db_types::{Creator, FlagSeverity, FlagStatus, FlagType, FraudFlag, Json, MinorUnits},
    events::EventProducers,
    traits::LedgerError,
    CreatorApi,
    FraudApi,
};
use serde_json::{json, Value};

use super::helpers::{post_request, valid_token};
use crate::{
    auth::Role,
    data_objects::{FlagReviewRequest, NewPlanRequest, ReasonRequest},
    endpoint_tests::mocks::{MockCreatorManager, MockFraudManager},
    routes::{RegisterPlanRoute, ReviewFlagRoute, SuspendCreatorRoute},
};

fn flag(id: i64, status: FlagStatus) -> FraudFlag {
    FraudFlag {
        id,
        creator_id: "alice".into(),
        flag_type: FlagType::Velocity,
        severity: FlagSeverity::High,
        score: 80,
        status,
        details: Json(json!({ "earnings_last_hour": 60 })),
        dedup_key: None,
        reviewed_by: None,
        reviewed_at: None,
        review_note: None,
        auto_cleared: false,
        created_at: Utc::now(),
    }
}

fn configure_fraud(cfg: &mut ServiceConfig) {
    let mut fraud = MockFraudManager::new();
    fraud
        .expect_review_flag()
        .withf(|id, status, reviewer, note| {
            *id == 7 && *status == FlagStatus::Cleared && reviewer == "ops" && note == "Launch week spike"
        })
        .returning(|id, status, reviewer, note| {
            let mut flag = flag(id, status);
            flag.reviewed_by = Some(reviewer.to_string());
            flag.reviewed_at = Some(Utc::now());
            flag.review_note = Some(note.to_string());
            Ok(flag)
        });
    fraud
        .expect_review_flag()
        .withf(|id, _, _, _| *id == 8)
        .returning(|id, _, _, _| Err(LedgerError::FlagAlreadyClosed(id, FlagStatus::Confirmed)));
    let api = FraudApi::new(fraud, EventProducers::default());
    cfg.service(ReviewFlagRoute::<MockFraudManager>::new()).app_data(web::Data::new(api));
}

#[actix_web::test]
async fn creators_cannot_review_flags() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("alice", &[Role::Creator]);
    let body = FlagReviewRequest { status: FlagStatus::Cleared, note: "Not me".into() };
    let (status, body) = post_request(&token, "/api/admin/flags/7/review", &body, configure_fraud).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Insufficient Permissions"), "{body}");
}

#[actix_web::test]
async fn admin_reviews_a_flag() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("ops", &[Role::Admin]);
    let body = FlagReviewRequest { status: FlagStatus::Cleared, note: "Launch week spike".into() };
    let (status, body) = post_request(&token, "/api/admin/flags/7/review", &body, configure_fraud).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let flag: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(flag["id"], 7);
    assert_eq!(flag["status"], "cleared");
    assert_eq!(flag["reviewed_by"], "ops");
}

#[actix_web::test]
async fn reviewing_a_closed_flag_conflicts() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("ops", &[Role::Admin]);
    let body = FlagReviewRequest { status: FlagStatus::Cleared, note: String::default() };
    let (status, _) = post_request(&token, "/api/admin/flags/8/review", &body, configure_fraud).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

fn configure_creators(cfg: &mut ServiceConfig) {
    let mut creators = MockCreatorManager::new();
    creators.expect_suspend_creator().withf(|id, reason| id == "mallory" && reason == "Chargebacks").returning(
        |id, reason| {
            let now = Utc::now();
            Ok(Creator {
                creator_id: id.to_string(),
                subscription_price: MinorUnits::from(50_000),
                activated_at: None,
                suspended_at: Some(now),
                suspend_reason: Some(reason.to_string()),
                created_at: now,
                updated_at: now,
            })
        },
    );
    creators.expect_register_plan().never();
    let api = CreatorApi::new(creators, EventProducers::default());
    cfg.service(SuspendCreatorRoute::<MockCreatorManager>::new())
        .service(RegisterPlanRoute::<MockCreatorManager>::new())
        .app_data(web::Data::new(api));
}

#[actix_web::test]
async fn admin_suspends_a_creator() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("ops", &[Role::Admin]);
    let body = ReasonRequest { reason: "Chargebacks".into() };
    let (status, body) = post_request(&token, "/api/admin/creators/mallory/suspend", &body, configure_creators).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let creator: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(creator["creator_id"], "mallory");
    assert_eq!(creator["suspend_reason"], "Chargebacks");
}

#[actix_web::test]
async fn plans_with_an_impossible_fee_are_rejected() {
    let _ = env_logger::try_init().ok();
    let token = valid_token("ops", &[Role::Admin]);
    let body = NewPlanRequest {
        plan_id: "alice-monthly".into(),
        creator_id: "alice".into(),
        price: MinorUnits::from(50_000),
        currency: "NGN".into(),
        platform_fee_bps: 12_000,
    };
    let (status, body) = post_request(&token, "/api/admin/plans", &body, configure_creators).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("platform_fee_bps"), "{body}");
}
