use chrono::{Duration, Utc};
use creator_earnings_engine::{
    db_types::{MinorUnits, NewPayment, PaymentOutcome, Provider, SubscriptionPlan},
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    CreatorApi,
    DenialReason,
    FraudApi,
    LedgerApi,
    PayoutApi,
    ReconcilerApi,
    SqliteDatabase,
};
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct PayoutWorld {
    pub system: Option<PayoutSystem>,
}

#[derive(Debug)]
pub struct PayoutSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub creators: CreatorApi<SqliteDatabase>,
    pub reconciler: ReconcilerApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
    pub fraud: FraudApi<SqliteDatabase>,
    /// The result of the last eligibility check or payout request
    pub outcome: Option<Result<(), DenialReason>>,
    next_reference: u64,
}

/// Amounts in the feature files are whole shillings.
pub fn kes(amount: i64) -> MinorUnits {
    MinorUnits::from(amount * 100)
}

impl PayoutWorld {
    pub fn system(&mut self) -> &mut PayoutSystem {
        self.system.as_mut().expect("The ledger has not been initialised")
    }
}

impl PayoutSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        Self {
            db_path: url,
            creators: CreatorApi::new(db.clone(), EventProducers::default()),
            reconciler: ReconcilerApi::new(db.clone(), EventProducers::default()),
            ledger: LedgerApi::new(db.clone(), EventProducers::default()),
            payouts: PayoutApi::new(db.clone(), EventProducers::default()),
            fraud: FraudApi::new(db.clone(), EventProducers::default()),
            db,
            outcome: None,
            next_reference: 1,
        }
    }

    /// Creates the creator with a zero-fee plan so that earnings equal the amounts paid.
    pub async fn register_creator(&self, creator_id: &str, activated_days_ago: Option<i64>) {
        self.creators.upsert_creator(creator_id, kes(500)).await.expect("Error creating creator");
        let plan = SubscriptionPlan {
            plan_id: format!("{creator_id}_plan"),
            creator_id: creator_id.to_string(),
            price: kes(500),
            currency: "KES".to_string(),
            platform_fee_bps: 0,
        };
        self.creators.register_plan(plan).await.expect("Error registering plan");
        if let Some(days) = activated_days_ago {
            let at = Utc::now() - Duration::days(days);
            self.creators.activate_creator(creator_id, Some(at)).await.expect("Error activating creator");
        }
    }

    pub async fn earn(&mut self, creator_id: &str, amount: i64) {
        let reference = format!("PAY_bdd{}", self.next_reference);
        self.next_reference += 1;
        let payment = NewPayment::new("subscriber", kes(amount), "KES", Provider::Paystack, &reference)
            .with_creator(creator_id)
            .with_plan(&format!("{creator_id}_plan"));
        self.reconciler.initiate_payment(payment).await.expect("Error initiating payment");
        let outcome = PaymentOutcome::success(Provider::Paystack, &reference, &format!("txn_{reference}"));
        let change = self.reconciler.apply(&outcome).await.expect("Error applying outcome");
        assert!(change.earning.is_some(), "No earning was posted for {reference}");
    }

    pub async fn clear_everything(&self) {
        self.ledger.clear_due_earnings(Utc::now() + Duration::days(8), 1000).await.expect("Error clearing earnings");
    }
}
