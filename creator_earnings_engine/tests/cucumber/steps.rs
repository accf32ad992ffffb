use creator_earnings_engine::{
    db_types::{FlagType, NewPayoutRequest, PayoutDestination},
    traits::LedgerError,
};
use cucumber::{given, then, when};

use crate::cucumber::{
    world::{kes, PayoutSystem},
    PayoutWorld,
};

fn destination() -> PayoutDestination {
    PayoutDestination::Mpesa { phone_number: "254712345678".into() }
}

#[given("a fresh ledger")]
async fn fresh_ledger(world: &mut PayoutWorld) {
    world.system = Some(PayoutSystem::new().await);
}

#[given(expr = "creator '{word}' was activated {int} days ago")]
async fn activated_creator(world: &mut PayoutWorld, creator_id: String, days: i64) {
    world.system().register_creator(&creator_id, Some(days)).await;
}

#[given(expr = "creator '{word}' has not been activated")]
async fn inactive_creator(world: &mut PayoutWorld, creator_id: String) {
    world.system().register_creator(&creator_id, None).await;
}

#[given(expr = "'{word}' has earned {int} KES that has cleared")]
async fn cleared_earnings(world: &mut PayoutWorld, creator_id: String, amount: i64) {
    let sys = world.system();
    sys.earn(&creator_id, amount).await;
    sys.clear_everything().await;
}

#[given(expr = "'{word}' has earned {int} KES that is still pending")]
async fn pending_earnings(world: &mut PayoutWorld, creator_id: String, amount: i64) {
    world.system().earn(&creator_id, amount).await;
}

#[given(expr = "'{word}' is suspended for {string}")]
async fn suspend(world: &mut PayoutWorld, creator_id: String, reason: String) {
    world.system().creators.suspend_creator(&creator_id, &reason).await.expect("Error suspending creator");
}

#[given(expr = "'{word}' has been flagged for review")]
async fn flag(world: &mut PayoutWorld, creator_id: String) {
    let sys = world.system();
    sys.fraud.flag_for_review(&creator_id, FlagType::PayoutEdit, "Flagged by an operator").await.expect("Error flagging");
}

#[given(expr = "'{word}' has already withdrawn {int} KES this week")]
async fn already_withdrawn(world: &mut PayoutWorld, creator_id: String, amount: i64) {
    let sys = world.system();
    let request = NewPayoutRequest::new(&creator_id, kes(amount), destination());
    let payout = sys.payouts.request_payout(request).await.expect("Error requesting payout");
    sys.payouts.begin_processing(payout.id, "ops", "").await.expect("Error approving payout");
    sys.payouts.complete_payout(payout.id, &format!("B2C_{}", payout.id), None).await.expect("Error completing payout");
}

#[when(expr = "'{word}' asks whether they can withdraw {int} KES")]
async fn check_eligibility(world: &mut PayoutWorld, creator_id: String, amount: i64) {
    let sys = world.system();
    let eligibility = sys.payouts.evaluate(&creator_id, kes(amount)).await.expect("Error evaluating payout");
    sys.outcome = Some(eligibility.denial().map_or(Ok(()), Err));
}

#[when(expr = "'{word}' requests a payout of {int} KES")]
async fn request_payout(world: &mut PayoutWorld, creator_id: String, amount: i64) {
    let sys = world.system();
    let request = NewPayoutRequest::new(&creator_id, kes(amount), destination());
    let outcome = match sys.payouts.request_payout(request).await {
        Ok(_) => Ok(()),
        Err(LedgerError::PayoutDenied(reason)) => Err(reason),
        Err(e) => panic!("Unexpected error requesting a payout: {e}"),
    };
    sys.outcome = Some(outcome);
}

#[then("the payout is allowed")]
async fn allowed(world: &mut PayoutWorld) {
    let outcome = world.system().outcome.take().expect("No payout was attempted");
    assert_eq!(outcome, Ok(()));
}

#[then(expr = "the payout is denied with {string}")]
async fn denied(world: &mut PayoutWorld, code: String) {
    let outcome = world.system().outcome.take().expect("No payout was attempted");
    match outcome {
        Err(reason) => assert_eq!(reason.code(), code),
        Ok(()) => panic!("The payout was allowed, but should have been denied with {code}"),
    }
}

#[then(expr = "'{word}' has {int} KES available and {int} KES locked")]
async fn check_balance(world: &mut PayoutWorld, creator_id: String, available: i64, locked: i64) {
    let balance = world.system().ledger.verify_balance(&creator_id).await.expect("Balance does not add up");
    assert_eq!(balance.available, kes(available), "Available balance is incorrect");
    assert_eq!(balance.locked, kes(locked), "Locked balance is incorrect");
}
