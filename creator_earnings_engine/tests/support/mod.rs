#![allow(dead_code)]
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use creator_earnings_engine::{
    db_types::{CreatorBalance, MinorUnits, NewPayment, PaymentOutcome, Provider, SubscriptionPlan},
    events::EventProducers,
    test_utils::{drop_database, prepare_test_env, random_db_path},
    traits::PaymentStatusChange,
    CreatorApi,
    LedgerApi,
    ReconcilerApi,
    SqliteDatabase,
};

static REFERENCE: AtomicU64 = AtomicU64::new(1);

pub async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    drop_database(&url).await;
}

pub fn next_reference() -> String {
    format!("PAY_test{}", REFERENCE.fetch_add(1, Ordering::SeqCst))
}

pub fn zero_fee_plan(creator_id: &str) -> String {
    format!("{creator_id}_no_fee")
}

/// Registers the creator with a zero-fee plan, so postings credit the full amount.
pub async fn register_creator(db: &SqliteDatabase, creator_id: &str, activated_days_ago: Option<i64>) {
    let api = CreatorApi::new(db.clone(), EventProducers::default());
    api.upsert_creator(creator_id, MinorUnits::from(50_000)).await.expect("Error creating creator");
    let plan = SubscriptionPlan {
        plan_id: zero_fee_plan(creator_id),
        creator_id: creator_id.to_string(),
        price: MinorUnits::from(50_000),
        currency: "KES".to_string(),
        platform_fee_bps: 0,
    };
    api.register_plan(plan).await.expect("Error registering plan");
    if let Some(days) = activated_days_ago {
        api.activate_creator(creator_id, Some(Utc::now() - Duration::days(days))).await.expect("Error activating");
    }
}

/// A successful payment of `amount` from `payer_id` to `creator_id`, on the creator's zero-fee plan.
pub async fn pay(db: &SqliteDatabase, payer_id: &str, creator_id: &str, amount: i64) -> PaymentStatusChange {
    let api = ReconcilerApi::new(db.clone(), EventProducers::default());
    let reference = next_reference();
    let payment = NewPayment::new(payer_id, MinorUnits::from(amount), "KES", Provider::Paystack, &reference)
        .with_creator(creator_id)
        .with_plan(&zero_fee_plan(creator_id));
    api.initiate_payment(payment).await.expect("Error initiating payment");
    let outcome = PaymentOutcome::success(Provider::Paystack, &reference, &format!("txn_{reference}"));
    api.apply(&outcome).await.expect("Error applying outcome")
}

/// Clears everything that would be due in `days` days.
pub async fn clear_all(db: &SqliteDatabase, days: i64) -> usize {
    let api = LedgerApi::new(db.clone(), EventProducers::default());
    let result = api.clear_due_earnings(Utc::now() + Duration::days(days), 1000).await.expect("Error clearing");
    result.cleared.len()
}

/// An activated creator with `available` cleared funds.
pub async fn funded_creator(db: &SqliteDatabase, creator_id: &str, activated_days_ago: i64, available: i64) {
    register_creator(db, creator_id, Some(activated_days_ago)).await;
    pay(db, &format!("fan_of_{creator_id}"), creator_id, available).await;
    clear_all(db, 8).await;
}

pub async fn balance(db: &SqliteDatabase, creator_id: &str) -> CreatorBalance {
    LedgerApi::new(db.clone(), EventProducers::default()).balance(creator_id).await.expect("Error fetching balance")
}
