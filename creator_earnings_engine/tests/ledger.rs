use chrono::{Duration, Utc};
use creator_earnings_engine::{
    db_types::{EarningStatus, MinorUnits, ReviewSource},
    events::EventProducers,
    traits::{LedgerError, PaymentReconciliation, ReviewQueue},
    LedgerApi,
    ReconcilerApi,
    SqliteDatabase,
};

use crate::support::{balance, funded_creator, pay, register_creator, setup, tear_down};

mod support;

fn ledger(db: &SqliteDatabase) -> LedgerApi<SqliteDatabase> {
    LedgerApi::new(db.clone(), EventProducers::default())
}

#[tokio::test]
async fn earnings_clear_after_the_delay() {
    let db = setup().await;
    register_creator(&db, "alice", None).await;
    let earning = pay(&db, "fan1", "alice", 10_000).await.earning.unwrap();
    let api = ledger(&db);
    let err = api.clear_earning(earning.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotYetClearable(id, _) if id == earning.id));

    let swept = api.clear_due_earnings(Utc::now() + Duration::days(6), 100).await.unwrap();
    assert!(swept.cleared.is_empty());
    let later = Utc::now() + Duration::days(7) + Duration::minutes(1);
    let swept = api.clear_due_earnings(later, 100).await.unwrap();
    assert_eq!(swept.cleared.len(), 1);
    assert_eq!(swept.failed, 0);
    assert_eq!(swept.cleared[0].status, EarningStatus::Cleared);

    let bal = balance(&db, "alice").await;
    assert_eq!(bal.pending, MinorUnits::zero());
    assert_eq!(bal.available, MinorUnits::from(10_000));

    // Clearing again is a no-op
    assert!(api.clear_earning(earning.id, later).await.unwrap().is_none());
    assert_eq!(balance(&db, "alice").await.available, MinorUnits::from(10_000));
    assert!(matches!(api.clear_earning(9_999, later).await, Err(LedgerError::EarningNotFound(9_999))));
    tear_down(db).await;
}

#[tokio::test]
async fn refunds_come_out_of_the_right_bucket() {
    let db = setup().await;
    register_creator(&db, "alice", None).await;
    let pending = pay(&db, "fan1", "alice", 10_000).await.earning.unwrap();
    let api = ledger(&db);
    api.clear_due_earnings(Utc::now() + Duration::days(8), 100).await.unwrap();
    let still_pending = pay(&db, "fan2", "alice", 4_000).await.earning.unwrap();

    let refunded = api.refund_earning(still_pending.id, "Disputed").await.unwrap();
    assert_eq!(refunded.status, EarningStatus::Refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("Disputed"));
    assert!(refunded.refunded_at.is_some());
    let bal = balance(&db, "alice").await;
    assert_eq!(bal.pending, MinorUnits::zero());
    assert_eq!(bal.available, MinorUnits::from(10_000));

    api.refund_earning(pending.id, "Chargeback").await.unwrap();
    let bal = balance(&db, "alice").await;
    assert_eq!(bal.available, MinorUnits::zero());
    assert_eq!(bal.total_refunded, MinorUnits::from(14_000));
    assert_eq!(bal.total_earned, MinorUnits::from(14_000));

    let err = api.refund_earning(pending.id, "Again").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidEarningState(_, EarningStatus::Refunded)));
    tear_down(db).await;
}

#[tokio::test]
async fn refund_of_withdrawn_funds_is_refused() {
    let db = setup().await;
    register_creator(&db, "alice", None).await;
    let earning = pay(&db, "fan1", "alice", 10_000).await.earning.unwrap();
    let api = ledger(&db);
    api.clear_due_earnings(Utc::now() + Duration::days(8), 100).await.unwrap();
    let token = api.reserve("alice", MinorUnits::from(8_000)).await.unwrap();
    api.commit(token).await.unwrap();

    let err = api.refund_earning(earning.id, "Chargeback").await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInvariantViolation(_)));
    // Nothing was written
    assert_eq!(api.earning(earning.id).await.unwrap().status, EarningStatus::Cleared);
    let bal = balance(&db, "alice").await;
    assert_eq!(bal.available, MinorUnits::from(2_000));
    assert_eq!(bal.total_withdrawn, MinorUnits::from(8_000));
    assert_eq!(bal.total_refunded, MinorUnits::zero());
    tear_down(db).await;
}

#[tokio::test]
async fn reservations_commit_or_release() {
    let db = setup().await;
    register_creator(&db, "bob", None).await;
    pay(&db, "fan1", "bob", 10_000).await;
    let api = ledger(&db);
    // Pending money cannot be reserved
    let err = api.reserve("bob", MinorUnits::from(1)).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    api.clear_due_earnings(Utc::now() + Duration::days(8), 100).await.unwrap();

    let token = api.reserve("bob", MinorUnits::from(6_000)).await.unwrap();
    assert_eq!(token.amount(), MinorUnits::from(6_000));
    let bal = balance(&db, "bob").await;
    assert_eq!(bal.available, MinorUnits::from(4_000));
    assert_eq!(bal.locked, MinorUnits::from(6_000));
    let err = api.reserve("bob", MinorUnits::from(4_001)).await.unwrap_err();
    match err {
        LedgerError::InsufficientFunds { available, requested, .. } => {
            assert_eq!(available, MinorUnits::from(4_000));
            assert_eq!(requested, MinorUnits::from(4_001));
        },
        e => panic!("Expected insufficient funds, got {e}"),
    }

    let bal = api.release(token).await.unwrap();
    assert_eq!(bal.available, MinorUnits::from(10_000));
    assert_eq!(bal.locked, MinorUnits::zero());

    let token = api.reserve("bob", MinorUnits::from(2_500)).await.unwrap();
    let bal = api.commit(token).await.unwrap();
    assert_eq!(bal.available, MinorUnits::from(7_500));
    assert_eq!(bal.locked, MinorUnits::zero());
    assert_eq!(bal.total_withdrawn, MinorUnits::from(2_500));
    assert!(matches!(api.reserve("bob", MinorUnits::zero()).await, Err(LedgerError::InvalidRequest(_))));
    tear_down(db).await;
}

#[tokio::test]
async fn balances_survive_a_replay() {
    let db = setup().await;
    register_creator(&db, "carol", Some(30)).await;
    pay(&db, "fan1", "carol", 10_000).await;
    pay(&db, "fan2", "carol", 5_000).await;
    let api = ledger(&db);
    api.clear_due_earnings(Utc::now() + Duration::days(8), 1).await.unwrap();
    pay(&db, "fan3", "carol", 2_000).await;
    let stored = api.verify_balance("carol").await.unwrap();
    assert_eq!(stored.total(), MinorUnits::from(17_000));

    sqlx::query("UPDATE creator_balances SET available = available + 1 WHERE creator_id = 'carol'")
        .execute(db.pool())
        .await
        .unwrap();
    let err = api.verify_balance("carol").await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInvariantViolation(_)));
    let items = db.open_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, ReviewSource::InvariantViolation);
    assert_eq!(items[0].reference, "carol");
    tear_down(db).await;
}

#[tokio::test]
async fn direct_reservations_survive_a_replay() {
    let db = setup().await;
    register_creator(&db, "dana", Some(30)).await;
    pay(&db, "fan1", "dana", 10_000).await;
    let api = ledger(&db);
    api.clear_due_earnings(Utc::now() + Duration::days(8), 100).await.unwrap();

    let held = api.reserve("dana", MinorUnits::from(3_000)).await.unwrap();
    let bal = api.verify_balance("dana").await.unwrap();
    assert_eq!(bal.locked, MinorUnits::from(3_000));
    api.commit(held).await.unwrap();
    let bal = api.verify_balance("dana").await.unwrap();
    assert_eq!(bal.available, MinorUnits::from(7_000));
    assert_eq!(bal.total_withdrawn, MinorUnits::from(3_000));

    let held = api.reserve("dana", MinorUnits::from(2_000)).await.unwrap();
    api.release(held).await.unwrap();
    let bal = api.verify_balance("dana").await.unwrap();
    assert_eq!(bal.available, MinorUnits::from(7_000));
    assert_eq!(bal.locked, MinorUnits::zero());
    assert!(db.open_items().await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn refunds_that_would_overdraw_are_queued_once() {
    let db = setup().await;
    funded_creator(&db, "erin", 30, 1_000_000).await;
    let api = ledger(&db);
    let _held = api.reserve("erin", MinorUnits::from(900_000)).await.unwrap();
    let earning = api.earnings("erin").await.unwrap().pop().expect("earning was posted");

    let err = api.refund_earning(earning.id, "Card holder disputed").await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInvariantViolation(_)), "{err}");
    let err = api.refund_earning(earning.id, "Card holder disputed").await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInvariantViolation(_)), "{err}");
    let items = db.open_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, ReviewSource::InvariantViolation);
    assert_eq!(items[0].reference, format!("earning:{}", earning.id));

    // Refunding through the payment queues against the payment reference
    let payment = db.fetch_payment(earning.payment_id).await.unwrap().expect("payment exists");
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let err = reconciler.refund_payment(payment.provider, &payment.provider_reference, "Chargeback").await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInvariantViolation(_)), "{err}");
    let items = db.open_items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|i| i.reference == payment.provider_reference));
    assert_eq!(balance(&db, "erin").await.locked, MinorUnits::from(900_000));
    tear_down(db).await;
}

#[tokio::test]
async fn unknown_creators_have_empty_balances() {
    let db = setup().await;
    let bal = balance(&db, "nobody").await;
    assert_eq!(bal.total(), MinorUnits::zero());
    assert!(ledger(&db).verify_balance("nobody").await.is_ok());
    tear_down(db).await;
}
