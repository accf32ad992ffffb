use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use creator_earnings_engine::{
    cee_api::fraud_rules::hour_window_start,
    db_types::{FlagSeverity, FlagStatus, FlagType, MinorUnits, SubscriptionPlan},
    events::{EventHandlers, EventProducers},
    fraud_event_hooks,
    traits::LedgerError,
    CreatorApi,
    DenialReason,
    FraudApi,
    LedgerApi,
    PayoutApi,
    SqliteDatabase,
};
use futures_util::future::join_all;

use crate::support::{funded_creator, pay, register_creator, setup, tear_down};

mod support;

fn fraud(db: &SqliteDatabase) -> FraudApi<SqliteDatabase> {
    FraudApi::new(db.clone(), EventProducers::default())
}

#[tokio::test]
async fn velocity_flags_once_per_hour() {
    let db = setup().await;
    register_creator(&db, "speedy", Some(30)).await;
    let api = fraud(&db);
    for i in 0..9 {
        pay(&db, &format!("fan{i}"), "speedy", 1_000).await;
    }
    assert!(api.check_velocity("speedy", Utc::now()).await.unwrap().is_none());
    pay(&db, "fan9", "speedy", 1_000).await;
    let flag = api.check_velocity("speedy", Utc::now()).await.unwrap().expect("Ten earnings in an hour");
    assert_eq!(flag.flag_type, FlagType::Velocity);
    assert_eq!(flag.severity, FlagSeverity::High);
    assert_eq!(flag.status, FlagStatus::Open);
    assert_eq!(flag.score, 100);
    pay(&db, "fan10", "speedy", 1_000).await;
    // Same hour, same key
    assert!(api.check_velocity("speedy", Utc::now()).await.unwrap().is_none());
    assert_eq!(api.open_flags("speedy").await.unwrap().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn velocity_flags_do_not_repeat_across_the_hour_boundary() {
    let db = setup().await;
    register_creator(&db, "burst", Some(30)).await;
    for i in 0..10 {
        pay(&db, &format!("fan{i}"), "burst", 1_000).await;
    }
    let api = fraud(&db);
    let first = Utc::now();
    api.check_velocity("burst", first).await.unwrap().expect("Ten earnings in an hour");
    // The next hour has a new dedup key, but the same burst is still inside the sliding window
    let next_hour = hour_window_start(first) + ChronoDuration::hours(1) + ChronoDuration::seconds(1);
    assert!(api.check_velocity("burst", next_hour).await.unwrap().is_none());
    let flags = api.open_flags("burst").await.unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].flag_type, FlagType::Velocity);
    tear_down(db).await;
}

#[tokio::test]
async fn diversity_flag_clears_itself() {
    let db = setup().await;
    register_creator(&db, "circle", Some(30)).await;
    let api = fraud(&db);
    for i in 0..11 {
        pay(&db, &format!("friend{}", i % 2), "circle", 1_000).await;
    }
    let flag = api.check_diversity("circle").await.unwrap().expect("Two payers across eleven earnings");
    assert_eq!(flag.flag_type, FlagType::Diversity);
    assert_eq!(flag.details.0["distinct_payers"], 2);
    assert!(api.check_diversity("circle").await.unwrap().is_none());

    for i in 2..5 {
        pay(&db, &format!("friend{i}"), "circle", 1_000).await;
    }
    assert!(api.check_diversity("circle").await.unwrap().is_none());
    let flag = api.fetch_flag(flag.id).await.unwrap();
    assert_eq!(flag.status, FlagStatus::Cleared);
    assert!(flag.auto_cleared);
    assert_eq!(flag.reviewed_by.as_deref(), Some("system"));
    assert!(flag.dedup_key.is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn price_anomaly_can_be_raised_again_after_clearing() {
    let db = setup().await;
    for creator in ["a", "b", "c"] {
        register_creator(&db, creator, None).await;
    }
    let creators = CreatorApi::new(db.clone(), EventProducers::default());
    let api = fraud(&db);
    creators.upsert_creator("whale", MinorUnits::from(200_000)).await.unwrap();
    let first = api.check_price_anomaly("whale", MinorUnits::from(200_000)).await.unwrap().expect("4x the median");
    assert_eq!(first.details.0["median_price"], 50_000);
    assert!(api.check_price_anomaly("whale", MinorUnits::from(200_000)).await.unwrap().is_none());

    creators.upsert_creator("whale", MinorUnits::from(100_000)).await.unwrap();
    assert!(api.check_price_anomaly("whale", MinorUnits::from(100_000)).await.unwrap().is_none());
    assert_eq!(api.fetch_flag(first.id).await.unwrap().status, FlagStatus::Cleared);

    creators.upsert_creator("whale", MinorUnits::from(300_000)).await.unwrap();
    let second = api.check_price_anomaly("whale", MinorUnits::from(300_000)).await.unwrap().expect("Flagged again");
    assert_ne!(first.id, second.id);
    tear_down(db).await;
}

#[tokio::test]
async fn reviewing_flags() {
    let db = setup().await;
    register_creator(&db, "alice", Some(30)).await;
    let api = fraud(&db);
    let flag = api.flag_for_review("alice", FlagType::PayoutEdit, "Payout number changed").await.unwrap();
    assert_eq!(flag.severity, FlagSeverity::High);
    // Manual flags are never deduplicated
    let again = api.flag_for_review("alice", FlagType::PayoutEdit, "And again").await.unwrap();
    assert_ne!(flag.id, again.id);

    let err = api.review_flag(flag.id, FlagStatus::Open, "ops", "").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRequest(_)));
    let reviewed = api.review_flag(flag.id, FlagStatus::Confirmed, "ops", "Confirmed with the creator").await.unwrap();
    assert_eq!(reviewed.status, FlagStatus::Confirmed);
    assert_eq!(reviewed.reviewed_by.as_deref(), Some("ops"));
    assert!(reviewed.reviewed_at.is_some());
    assert!(!reviewed.auto_cleared);

    let err = api.review_flag(flag.id, FlagStatus::Cleared, "ops", "").await.unwrap_err();
    assert!(matches!(err, LedgerError::FlagAlreadyClosed(id, FlagStatus::Confirmed) if id == flag.id));
    assert!(matches!(api.review_flag(9999, FlagStatus::Cleared, "ops", "").await, Err(LedgerError::FlagNotFound(9999))));
    assert!(matches!(api.fetch_flag(9999).await, Err(LedgerError::FlagNotFound(9999))));
    assert_eq!(api.open_flags("alice").await.unwrap().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn open_flags_are_ordered_by_severity() {
    let db = setup().await;
    for creator in ["a", "b", "c"] {
        register_creator(&db, creator, None).await;
    }
    let creators = CreatorApi::new(db.clone(), EventProducers::default());
    let api = fraud(&db);
    creators.upsert_creator("whale", MinorUnits::from(400_000)).await.unwrap();
    api.check_price_anomaly("whale", MinorUnits::from(400_000)).await.unwrap().expect("flagged");
    api.flag_for_review("a", FlagType::PayoutEdit, "Suspicious edit").await.unwrap();
    let open = api.all_open_flags().await.unwrap();
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].severity, FlagSeverity::High);
    assert_eq!(open[0].creator_id, "a");
    assert_eq!(open[1].severity, FlagSeverity::Medium);
    tear_down(db).await;
}

#[tokio::test]
async fn refunds_raise_chargeback_flags() {
    let db = setup().await;
    register_creator(&db, "alice", Some(30)).await;
    let posted = pay(&db, "fan", "alice", 10_000).await;
    let handlers = EventHandlers::new(10, fraud_event_hooks(fraud(&db)));
    let ledger = LedgerApi::new(db.clone(), handlers.producers());
    handlers.start_handlers().await;

    let earning = ledger.earnings("alice").await.unwrap().pop().expect("earning was posted");
    assert_eq!(earning.payment_id, posted.payment.id);
    ledger.refund_earning(earning.id, "Card holder disputed").await.unwrap();

    let api = fraud(&db);
    let mut flags = Vec::new();
    for _ in 0..50 {
        flags = api.open_flags("alice").await.unwrap();
        if !flags.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].flag_type, FlagType::Chargeback);
    assert_eq!(flags[0].details.0["earning_id"], earning.id);
    assert_eq!(flags[0].details.0["reason"], "Card holder disputed");
    drop(ledger);
    tear_down(db).await;
}

#[tokio::test]
async fn single_writes_are_visible_on_every_connection() {
    let db = setup().await;
    funded_creator(&db, "zed", 30, 20_000).await;
    // Open every pooled connection so later calls land on different ones
    let warm = join_all((0..5).map(|_| db.pool().acquire())).await;
    assert!(warm.iter().all(Result::is_ok));
    drop(warm);

    let api = fraud(&db);
    api.flag_for_review("zed", FlagType::PayoutEdit, "Payout number changed").await.unwrap();
    let payouts = PayoutApi::new(db.clone(), EventProducers::default());
    for _ in 0..5 {
        let eligibility = payouts.evaluate("zed", MinorUnits::from(1_000)).await.unwrap();
        assert_eq!(eligibility.denial(), Some(DenialReason::UnderReview));
        assert_eq!(api.open_flags("zed").await.unwrap().len(), 1);
    }

    let creators = CreatorApi::new(db.clone(), EventProducers::default());
    let plan = SubscriptionPlan {
        plan_id: "zed_gold".to_string(),
        creator_id: "zed".to_string(),
        price: MinorUnits::from(90_000),
        currency: "KES".to_string(),
        platform_fee_bps: 1_500,
    };
    creators.register_plan(plan).await.unwrap();
    for _ in 0..5 {
        let plan = creators.fetch_plan("zed_gold").await.unwrap().expect("plan is visible");
        assert_eq!(plan.platform_fee_bps, 1_500);
    }
    tear_down(db).await;
}
