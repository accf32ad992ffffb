use chrono::{DateTime, Utc};
use creator_earnings_engine::{
    db_types::{
        BalanceBuckets,
        Creator,
        CreatorBalance,
        CreatorEarning,
        FlagStatus,
        FlagType,
        FraudFlag,
        MinorUnits,
        NewFraudFlag,
        NewPayment,
        NewReviewItem,
        Payment,
        PaymentOutcome,
        Provider,
        ReviewItem,
        SubscriptionPlan,
    },
    traits::{
        CreatorManagement,
        CreatorUpdate,
        EarningsLedger,
        FraudManagement,
        LedgerError,
        LedgerPolicy,
        PaymentReconciliation,
        PaymentStatusChange,
        ReservationToken,
        ReviewQueue,
    },
};
use mockall::mock;

mock! {
    pub LedgerBackend {}
    impl Clone for LedgerBackend {
        fn clone(&self) -> Self;
    }
    impl EarningsLedger for LedgerBackend {
        async fn post_earning(&self, payment_id: i64, policy: &LedgerPolicy) -> Result<CreatorEarning, LedgerError>;
        async fn fetch_earning(&self, id: i64) -> Result<Option<CreatorEarning>, LedgerError>;
        async fn fetch_earnings_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorEarning>, LedgerError>;
        async fn fetch_due_earnings(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<CreatorEarning>, LedgerError>;
        async fn clear_earning(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CreatorEarning>, LedgerError>;
        async fn refund_earning(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<CreatorEarning, LedgerError>;
        async fn fetch_balance(&self, creator_id: &str) -> Result<CreatorBalance, LedgerError>;
        async fn reserve(&self, creator_id: &str, amount: MinorUnits) -> Result<ReservationToken, LedgerError>;
        async fn commit_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError>;
        async fn release_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError>;
        async fn derive_balance(&self, creator_id: &str) -> Result<BalanceBuckets, LedgerError>;
    }
    impl ReviewQueue for LedgerBackend {
        async fn enqueue(&self, item: NewReviewItem) -> Result<ReviewItem, LedgerError>;
        async fn open_items(&self) -> Result<Vec<ReviewItem>, LedgerError>;
        async fn resolve(&self, id: i64, resolver: &str, note: &str) -> Result<ReviewItem, LedgerError>;
    }
}

mock! {
    pub ReconcilerBackend {}
    impl Clone for ReconcilerBackend {
        fn clone(&self) -> Self;
    }
    impl PaymentReconciliation for ReconcilerBackend {
        async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError>;
        async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, LedgerError>;
        async fn fetch_payment_by_reference(&self, provider: Provider, reference: &str) -> Result<Option<Payment>, LedgerError>;
        async fn apply_outcome(&self, outcome: &PaymentOutcome, policy: &LedgerPolicy) -> Result<PaymentStatusChange, LedgerError>;
        async fn refund_payment(&self, provider: Provider, reference: &str, reason: &str) -> Result<(Payment, Option<CreatorEarning>), LedgerError>;
        async fn fetch_stale_pending_payments(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>, LedgerError>;
        async fn fetch_payments_for_payer(&self, payer_id: &str) -> Result<Vec<Payment>, LedgerError>;
    }
    impl ReviewQueue for ReconcilerBackend {
        async fn enqueue(&self, item: NewReviewItem) -> Result<ReviewItem, LedgerError>;
        async fn open_items(&self) -> Result<Vec<ReviewItem>, LedgerError>;
        async fn resolve(&self, id: i64, resolver: &str, note: &str) -> Result<ReviewItem, LedgerError>;
    }
}

mock! {
    pub FraudManager {}
    impl Clone for FraudManager {
        fn clone(&self) -> Self;
    }
    impl FraudManagement for FraudManager {
        async fn count_earnings_since(&self, creator_id: &str, since: DateTime<Utc>) -> Result<i64, LedgerError>;
        async fn payer_diversity(&self, creator_id: &str) -> Result<(i64, i64), LedgerError>;
        async fn subscription_prices(&self) -> Result<Vec<MinorUnits>, LedgerError>;
        async fn insert_flag(&self, flag: NewFraudFlag) -> Result<Option<FraudFlag>, LedgerError>;
        async fn auto_clear_flags(&self, creator_id: &str, flag_type: FlagType, note: &str) -> Result<Vec<FraudFlag>, LedgerError>;
        async fn review_flag(&self, id: i64, status: FlagStatus, reviewer: &str, note: &str) -> Result<FraudFlag, LedgerError>;
        async fn fetch_flag(&self, id: i64) -> Result<Option<FraudFlag>, LedgerError>;
        async fn fetch_open_flags(&self, creator_id: &str) -> Result<Vec<FraudFlag>, LedgerError>;
        async fn fetch_all_open_flags(&self) -> Result<Vec<FraudFlag>, LedgerError>;
    }
}

mock! {
    pub CreatorManager {}
    impl Clone for CreatorManager {
        fn clone(&self) -> Self;
    }
    impl CreatorManagement for CreatorManager {
        async fn upsert_creator(&self, creator_id: &str, subscription_price: MinorUnits) -> Result<CreatorUpdate, LedgerError>;
        async fn fetch_creator(&self, creator_id: &str) -> Result<Option<Creator>, LedgerError>;
        async fn activate_creator(&self, creator_id: &str, at: DateTime<Utc>) -> Result<Creator, LedgerError>;
        async fn suspend_creator(&self, creator_id: &str, reason: &str) -> Result<Creator, LedgerError>;
        async fn unsuspend_creator(&self, creator_id: &str) -> Result<Creator, LedgerError>;
        async fn register_plan(&self, plan: SubscriptionPlan) -> Result<SubscriptionPlan, LedgerError>;
        async fn fetch_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, LedgerError>;
    }
}
