//! `SqliteDatabase` is the SQLite implementation of a creator earnings backend.
//!
//! It implements all the traits defined in the [`crate::traits`] module.
//!
//! SQLite allows one writer at a time. Every transaction that reads something before changing it therefore opens
//! with a write (a compare-and-set, or a "touch" of the row it is about to work on). That takes the database write
//! lock up front, so a transaction never has to upgrade a read lock halfway through and concurrent writers simply
//! queue behind the busy timeout.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Months, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    balances,
    caps,
    creators,
    db_url,
    earnings,
    flags,
    new_pool,
    payments,
    payouts,
    reservations,
    review_queue,
};
use crate::{
    cee_api::risk_rules::{assess, DenialReason, Eligibility, RiskPolicy, RiskSnapshot},
    db_types::{
        BalanceBuckets,
        Creator,
        CreatorBalance,
        CreatorEarning,
        CreatorPayout,
        EarningStatus,
        FlagStatus,
        FlagType,
        FraudFlag,
        MinorUnits,
        NewFraudFlag,
        NewPayment,
        NewPayoutRequest,
        NewReviewItem,
        OutcomeKind,
        Payment,
        PaymentOutcome,
        PaymentStatus,
        PayoutStatus,
        Provider,
        ReviewItem,
        SubscriptionPlan,
    },
    traits::{
        CreatorManagement,
        CreatorUpdate,
        EarningsLedger,
        FeeSplit,
        FraudManagement,
        LedgerError,
        LedgerPolicy,
        PaymentReconciliation,
        PaymentStatusChange,
        PayoutManagement,
        ReservationToken,
        ReviewQueue,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the url from the environment
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn set_suspension(&self, creator_id: &str, reason: Option<&str>) -> Result<Creator, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let creator = creators::set_suspension(creator_id, reason, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| LedgerError::CreatorNotFound(creator_id.to_string()))?;
        tx.commit().await?;
        Ok(creator)
    }
}

//--------------------------------------   Transaction helpers   -------------------------------------------------------

const MAX_FEE_BPS: u32 = 10_000;

/// `paid_at` plus one calendar month. Month ends clamp (31 Jan + 1 month = 29 Feb in a leap year).
fn subscription_expiry(paid_at: DateTime<Utc>) -> DateTime<Utc> {
    paid_at.checked_add_months(Months::new(1)).unwrap_or(paid_at + Duration::days(30))
}

/// The payment's plan fee, or the default fee for payments without a plan. Plans are checked when the payment is
/// recorded, so a missing or broken plan at posting time is an invariant violation.
async fn fee_bps_for(payment: &Payment, policy: &LedgerPolicy, conn: &mut SqliteConnection) -> Result<u32, LedgerError> {
    let plan_id = match &payment.plan_id {
        Some(plan_id) => plan_id,
        None => return Ok(policy.default_fee_bps),
    };
    let plan = creators::fetch_plan(plan_id, conn).await?.ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Payment #{} names unknown plan {plan_id}", payment.id))
    })?;
    u32::try_from(plan.platform_fee_bps).ok().filter(|bps| *bps <= MAX_FEE_BPS).ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!(
            "Plan {plan_id} has an out of range platform fee of {} basis points",
            plan.platform_fee_bps
        ))
    })
}

/// Rejects a payment whose plan does not exist or belongs to another creator.
async fn check_plan(payment: &Payment, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let plan_id = match &payment.plan_id {
        Some(plan_id) => plan_id,
        None => return Ok(()),
    };
    match creators::fetch_plan(plan_id, conn).await? {
        Some(plan) if payment.creator_id.as_deref() == Some(plan.creator_id.as_str()) => Ok(()),
        Some(plan) => Err(LedgerError::InvalidRequest(format!(
            "Plan {plan_id} belongs to {}, not {}",
            plan.creator_id,
            payment.creator_id.as_deref().unwrap_or("the platform")
        ))),
        None => Err(LedgerError::InvalidRequest(format!("Unknown subscription plan {plan_id}"))),
    }
}

/// Posts the earning for a successful payment and credits the creator's pending balance. Returns `None` for
/// platform revenue, or if the payment had already been posted.
async fn post_earning_in_tx(
    payment: &Payment,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CreatorEarning>, LedgerError> {
    let creator_id = match &payment.creator_id {
        Some(c) => c,
        None => {
            debug!("🗃️ Payment #{} has no creator. Nothing to post.", payment.id);
            return Ok(None);
        },
    };
    let bps = fee_bps_for(payment, policy, conn).await?;
    let split = FeeSplit::new(payment.amount, bps);
    let earning = earnings::idempotent_insert(payment, creator_id, split, policy.clearing_delay, now, conn).await?;
    if let Some(earning) = &earning {
        balances::credit_pending(creator_id, earning.net_amount, now, conn).await?;
        debug!(
            "🗃️ Earning #{} posted for {creator_id}: gross {}, fee {}, net {}. Clears at {}",
            earning.id, split.gross, split.fee, split.net, earning.clears_at
        );
    }
    Ok(earning)
}

/// Refunds an earning and takes its net amount out of whichever bucket currently holds it.
async fn refund_earning_in_tx(
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CreatorEarning, LedgerError> {
    let earning = match earnings::mark_refunded(id, reason, now, conn).await? {
        Some(e) => e,
        None => {
            let existing = earnings::fetch_earning(id, conn).await?.ok_or(LedgerError::EarningNotFound(id))?;
            return Err(LedgerError::InvalidEarningState(id, existing.status));
        },
    };
    // cleared_at survives the refund, so it tells us which bucket the money was in
    let from_available = earning.cleared_at.is_some();
    balances::reverse_earning(&earning.creator_id, earning.net_amount, from_available, now, conn).await?;
    debug!("🗃️ Earning #{id} refunded ({reason}). {} reversed for {}", earning.net_amount, earning.creator_id);
    Ok(earning)
}

async fn load_risk_snapshot(
    creator_id: &str,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RiskSnapshot, LedgerError> {
    let creator = creators::fetch_creator(creator_id, conn).await?;
    let available = balances::fetch_balance(creator_id, conn).await?.map(|b| b.available).unwrap_or_default();
    let blocking_flags = flags::count_blocking_flags(creator_id, conn).await?;
    let current_cap = match creator.as_ref().and_then(|c| c.activated_at) {
        Some(activated_at) if activated_at <= now => {
            let week = policy.week_index(activated_at, now);
            caps::fetch_cap(creator_id, week, conn).await?
        },
        _ => None,
    };
    Ok(RiskSnapshot { creator_id: creator_id.to_string(), creator, available, blocking_flags, current_cap })
}

/// Works out why a payout compare-and-set matched nothing.
async fn payout_transition_error(id: i64, to: PayoutStatus, conn: &mut SqliteConnection) -> LedgerError {
    match payouts::fetch_payout(id, conn).await {
        Ok(Some(payout)) => match payout.status.transition(to) {
            Err(e) => LedgerError::InvalidPayoutTransition(id, e),
            Ok(_) => LedgerError::DatabaseError(format!("Payout #{id} changed while it was being updated")),
        },
        Ok(None) => LedgerError::PayoutNotFound(id),
        Err(e) => e,
    }
}

/// The still-held reservation behind an in-flight payout.
async fn payout_reservation(payout: &CreatorPayout, conn: &mut SqliteConnection) -> Result<ReservationToken, LedgerError> {
    let id = payout.reservation_id.ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Payout #{} has no balance reservation", payout.id))
    })?;
    reservations::fetch_held(id, conn).await?.ok_or_else(|| {
        LedgerError::LedgerInvariantViolation(format!("Reservation #{id} for payout #{} is no longer held", payout.id))
    })
}

/// Moves a payout to `failed` or `cancelled` and gives back its reservation and cap.
async fn unwind_payout(
    pool: &SqlitePool,
    id: i64,
    from: PayoutStatus,
    to: PayoutStatus,
    reason: &str,
) -> Result<CreatorPayout, LedgerError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let payout = match payouts::mark_unsuccessful(id, from, to, reason, now, &mut tx).await? {
        Some(p) => p,
        None => return Err(payout_transition_error(id, to, &mut tx).await),
    };
    let token = payout_reservation(&payout, &mut tx).await?;
    reservations::release(token, now, &mut tx).await?;
    caps::release(&payout.creator_id, payout.cap_week, payout.amount, &mut tx).await?;
    tx.commit().await?;
    debug!("🗃️ Payout #{id} is {to}. {} released back to {}", payout.amount, payout.creator_id);
    Ok(payout)
}

//--------------------------------------  PaymentReconciliation  -------------------------------------------------------
impl PaymentReconciliation for SqliteDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        // Dropping the transaction on error takes the insert back out
        check_plan(&payment, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment #{} ({} {}) recorded as pending", payment.id, payment.provider, payment.provider_reference);
        Ok(payment)
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn fetch_payment_by_reference(
        &self,
        provider: Provider,
        reference: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_reference(provider, reference, &mut conn).await
    }

    async fn apply_outcome(
        &self,
        outcome: &PaymentOutcome,
        policy: &LedgerPolicy,
    ) -> Result<PaymentStatusChange, LedgerError> {
        let provider = outcome.provider;
        let reference = outcome.reference.as_str();
        let target = match outcome.target_status() {
            Some(t) => t,
            None => {
                let payment = self
                    .fetch_payment_by_reference(provider, reference)
                    .await?
                    .ok_or_else(|| LedgerError::PaymentNotFound(provider, reference.to_string()))?;
                trace!("🗃️ Pending outcome for {provider} payment {reference}. Nothing to do.");
                return Ok(PaymentStatusChange::unchanged(payment));
            },
        };
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated = match &outcome.kind {
            OutcomeKind::Success { provider_txn_id, amount, paid_at } => {
                let paid_at = paid_at.unwrap_or(now);
                let expires_at = subscription_expiry(paid_at);
                let updated =
                    payments::mark_success(provider, reference, provider_txn_id, paid_at, expires_at, &mut tx).await?;
                if let (Some(payment), Some(reported)) = (&updated, amount) {
                    if *reported != payment.amount {
                        // Dropping the transaction rolls the status change back
                        return Err(LedgerError::AmountMismatch {
                            reference: reference.to_string(),
                            expected: payment.amount,
                            reported: *reported,
                        });
                    }
                }
                updated
            },
            OutcomeKind::Failure { reason } | OutcomeKind::Cancelled { reason } => {
                payments::mark_unsuccessful(provider, reference, target, reason, &mut tx).await?
            },
            OutcomeKind::Pending => None,
        };
        match updated {
            Some(payment) => {
                let earning = if payment.status == PaymentStatus::Success {
                    post_earning_in_tx(&payment, policy, now, &mut tx).await?
                } else {
                    None
                };
                tx.commit().await?;
                debug!("🗃️ {provider} payment {reference} is now {}", payment.status);
                Ok(PaymentStatusChange { payment, previous_status: PaymentStatus::Pending, changed: true, earning })
            },
            None => {
                let existing = payments::fetch_payment_by_reference(provider, reference, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::PaymentNotFound(provider, reference.to_string()))?;
                if existing.status == target {
                    trace!("🗃️ {provider} payment {reference} is already {target}. Nothing to do.");
                    Ok(PaymentStatusChange::unchanged(existing))
                } else {
                    Err(LedgerError::Conflict {
                        reference: reference.to_string(),
                        current: existing.status,
                        attempted: target,
                    })
                }
            },
        }
    }

    async fn refund_payment(
        &self,
        provider: Provider,
        reference: &str,
        reason: &str,
    ) -> Result<(Payment, Option<CreatorEarning>), LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let payment = match payments::mark_refunded(provider, reference, reason, &mut tx).await? {
            Some(p) => p,
            None => {
                let existing = payments::fetch_payment_by_reference(provider, reference, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::PaymentNotFound(provider, reference.to_string()))?;
                if existing.status == PaymentStatus::Refunded {
                    let earning = earnings::fetch_earning_for_payment(existing.id, &mut tx).await?;
                    return Ok((existing, earning));
                }
                return Err(LedgerError::Conflict {
                    reference: reference.to_string(),
                    current: existing.status,
                    attempted: PaymentStatus::Refunded,
                });
            },
        };
        let earning = match earnings::fetch_earning_for_payment(payment.id, &mut tx).await? {
            Some(e) if e.status != EarningStatus::Refunded => {
                Some(refund_earning_in_tx(e.id, reason, now, &mut tx).await?)
            },
            other => other,
        };
        tx.commit().await?;
        debug!("🗃️ {provider} payment {reference} refunded ({reason})");
        Ok((payment, earning))
    }

    async fn fetch_stale_pending_payments(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_stale_pending(older_than, limit, &mut conn).await
    }

    async fn fetch_payments_for_payer(&self, payer_id: &str) -> Result<Vec<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments_for_payer(payer_id, &mut conn).await
    }
}

//--------------------------------------     EarningsLedger     --------------------------------------------------------
impl EarningsLedger for SqliteDatabase {
    async fn post_earning(&self, payment_id: i64, policy: &LedgerPolicy) -> Result<CreatorEarning, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let payment = payments::touch_payment(payment_id, &mut tx)
            .await?
            .ok_or_else(|| LedgerError::InvalidRequest(format!("Payment #{payment_id} does not exist")))?;
        if payment.status != PaymentStatus::Success {
            return Err(LedgerError::InvalidRequest(format!(
                "Payment #{payment_id} is {} and cannot be posted",
                payment.status
            )));
        }
        if payment.creator_id.is_none() {
            return Err(LedgerError::InvalidRequest(format!("Payment #{payment_id} has no creator to credit")));
        }
        let earning = match post_earning_in_tx(&payment, policy, now, &mut tx).await? {
            Some(e) => e,
            None => earnings::fetch_earning_for_payment(payment_id, &mut tx).await?.ok_or_else(|| {
                LedgerError::DatabaseError(format!("Earning for payment #{payment_id} vanished during posting"))
            })?,
        };
        tx.commit().await?;
        Ok(earning)
    }

    async fn fetch_earning(&self, id: i64) -> Result<Option<CreatorEarning>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::fetch_earning(id, &mut conn).await
    }

    async fn fetch_earnings_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorEarning>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::fetch_earnings_for_creator(creator_id, &mut conn).await
    }

    async fn fetch_due_earnings(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<CreatorEarning>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::fetch_due(now, limit, &mut conn).await
    }

    async fn clear_earning(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CreatorEarning>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        match earnings::mark_cleared(id, now, &mut tx).await? {
            Some(earning) => {
                balances::move_pending_to_available(&earning.creator_id, earning.net_amount, now, &mut tx).await?;
                tx.commit().await?;
                trace!("🗃️ Earning #{id} cleared. {} is now available to {}", earning.net_amount, earning.creator_id);
                Ok(Some(earning))
            },
            None => {
                let existing = earnings::fetch_earning(id, &mut tx).await?.ok_or(LedgerError::EarningNotFound(id))?;
                match existing.status {
                    EarningStatus::Cleared => Ok(None),
                    EarningStatus::Pending => Err(LedgerError::NotYetClearable(id, existing.clears_at)),
                    EarningStatus::Refunded => Err(LedgerError::InvalidEarningState(id, existing.status)),
                }
            },
        }
    }

    async fn refund_earning(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<CreatorEarning, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let earning = refund_earning_in_tx(id, reason, now, &mut tx).await?;
        tx.commit().await?;
        Ok(earning)
    }

    async fn fetch_balance(&self, creator_id: &str) -> Result<CreatorBalance, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let balance = balances::fetch_balance(creator_id, &mut conn).await?;
        Ok(balance.unwrap_or_else(|| CreatorBalance::empty(creator_id)))
    }

    async fn reserve(&self, creator_id: &str, amount: MinorUnits) -> Result<ReservationToken, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidRequest(format!("Cannot reserve {amount}")));
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let balance = balances::lock_balance(creator_id, now, &mut tx).await?;
        let token = reservations::hold(creator_id, amount, now, &mut tx).await?.ok_or_else(|| {
            LedgerError::InsufficientFunds {
                creator_id: creator_id.to_string(),
                requested: amount,
                available: balance.available,
            }
        })?;
        tx.commit().await?;
        trace!("🗃️ Reservation #{} holds {amount} of {creator_id}'s balance", token.id());
        Ok(token)
    }

    async fn commit_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError> {
        let id = token.id();
        let mut tx = self.pool.begin().await?;
        let balance = reservations::commit(token, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Reservation #{id} committed");
        Ok(balance)
    }

    async fn release_reservation(&self, token: ReservationToken) -> Result<CreatorBalance, LedgerError> {
        let id = token.id();
        let mut tx = self.pool.begin().await?;
        let balance = reservations::release(token, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Reservation #{id} released");
        Ok(balance)
    }

    async fn derive_balance(&self, creator_id: &str) -> Result<BalanceBuckets, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let (pending, cleared) = earnings::net_totals(creator_id, &mut conn).await?;
        let (locked, withdrawn) = reservations::totals(creator_id, &mut conn).await?;
        Ok(BalanceBuckets { available: cleared - withdrawn - locked, pending, locked })
    }
}

//--------------------------------------    PayoutManagement    --------------------------------------------------------
impl PayoutManagement for SqliteDatabase {
    async fn risk_snapshot(
        &self,
        creator_id: &str,
        policy: &RiskPolicy,
        now: DateTime<Utc>,
    ) -> Result<RiskSnapshot, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        load_risk_snapshot(creator_id, policy, now, &mut conn).await
    }

    async fn create_payout(
        &self,
        request: NewPayoutRequest,
        fee: MinorUnits,
        policy: &RiskPolicy,
        now: DateTime<Utc>,
    ) -> Result<CreatorPayout, LedgerError> {
        request.destination.validate().map_err(|e| LedgerError::InvalidRequest(e.to_string()))?;
        if fee.is_negative() || request.amount <= fee {
            return Err(LedgerError::InvalidRequest(format!(
                "A payout of {} does not cover the {fee} payout fee",
                request.amount
            )));
        }
        let creator_id = request.creator_id.as_str();
        let mut tx = self.pool.begin().await?;
        balances::lock_balance(creator_id, now, &mut tx).await?;
        let snapshot = load_risk_snapshot(creator_id, policy, now, &mut tx).await?;
        let cap = match assess(&snapshot, request.amount, now, policy) {
            Eligibility::Eligible { cap } => cap,
            Eligibility::Denied { reason } => return Err(LedgerError::PayoutDenied(reason)),
        };
        let token = match reservations::hold(creator_id, request.amount, now, &mut tx).await? {
            Some(token) => token,
            None => return Err(LedgerError::PayoutDenied(DenialReason::InsufficientFunds)),
        };
        caps::materialize(creator_id, &cap, &mut tx).await?;
        if caps::consume(creator_id, cap.week, request.amount, &mut tx).await?.is_none() {
            return Err(LedgerError::PayoutDenied(DenialReason::CapExceeded));
        }
        let payout = payouts::insert_payout(&request, fee, cap.week, token.id(), now, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payout #{} of {} created for {creator_id}. Week {} cap has {} left",
            payout.id,
            payout.amount,
            cap.week,
            cap.remaining() - payout.amount
        );
        Ok(payout)
    }

    async fn fetch_payout(&self, id: i64) -> Result<Option<CreatorPayout>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payout(id, &mut conn).await
    }

    async fn fetch_payouts_for_creator(&self, creator_id: &str) -> Result<Vec<CreatorPayout>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payouts_for_creator(creator_id, &mut conn).await
    }

    async fn begin_processing(&self, id: i64, reviewer: &str, note: &str) -> Result<CreatorPayout, LedgerError> {
        let mut tx = self.pool.begin().await?;
        match payouts::mark_processing(id, reviewer, note, Utc::now(), &mut tx).await? {
            Some(payout) => {
                tx.commit().await?;
                Ok(payout)
            },
            None => Err(payout_transition_error(id, PayoutStatus::Processing, &mut tx).await),
        }
    }

    async fn complete_payout(
        &self,
        id: i64,
        provider_reference: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CreatorPayout, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let payout = match payouts::mark_completed(id, provider_reference, provider_txn_id, now, &mut tx).await? {
            Some(p) => p,
            None => return Err(payout_transition_error(id, PayoutStatus::Completed, &mut tx).await),
        };
        let token = payout_reservation(&payout, &mut tx).await?;
        reservations::commit(token, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payout #{id} completed. {} withdrawn by {}", payout.amount, payout.creator_id);
        Ok(payout)
    }

    async fn fail_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError> {
        unwind_payout(&self.pool, id, PayoutStatus::Processing, PayoutStatus::Failed, reason).await
    }

    async fn cancel_payout(&self, id: i64, reason: &str) -> Result<CreatorPayout, LedgerError> {
        unwind_payout(&self.pool, id, PayoutStatus::Pending, PayoutStatus::Cancelled, reason).await
    }
}

//--------------------------------------     FraudManagement    --------------------------------------------------------
impl FraudManagement for SqliteDatabase {
    async fn count_earnings_since(&self, creator_id: &str, since: DateTime<Utc>) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::count_since(creator_id, since, &mut conn).await
    }

    async fn payer_diversity(&self, creator_id: &str) -> Result<(i64, i64), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::payer_diversity(creator_id, &mut conn).await
    }

    async fn subscription_prices(&self) -> Result<Vec<MinorUnits>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        creators::subscription_prices(&mut conn).await
    }

    async fn insert_flag(&self, flag: NewFraudFlag) -> Result<Option<FraudFlag>, LedgerError> {
        let key = flag.dedup_key.clone();
        let mut tx = self.pool.begin().await?;
        let flag = flags::insert_flag(flag, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        if flag.is_none() {
            trace!("🗃️ A flag with key {key:?} exists or was raised recently. Not raising another one.");
        }
        Ok(flag)
    }

    async fn auto_clear_flags(
        &self,
        creator_id: &str,
        flag_type: FlagType,
        note: &str,
    ) -> Result<Vec<FraudFlag>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let cleared = flags::auto_clear(creator_id, flag_type, note, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(cleared)
    }

    async fn review_flag(
        &self,
        id: i64,
        status: FlagStatus,
        reviewer: &str,
        note: &str,
    ) -> Result<FraudFlag, LedgerError> {
        if status == FlagStatus::Open {
            return Err(LedgerError::InvalidRequest("A flag cannot be reviewed back to open".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        match flags::close_flag(id, status, reviewer, note, Utc::now(), &mut tx).await? {
            Some(flag) => {
                tx.commit().await?;
                Ok(flag)
            },
            None => {
                let existing = flags::fetch_flag(id, &mut tx).await?.ok_or(LedgerError::FlagNotFound(id))?;
                Err(LedgerError::FlagAlreadyClosed(id, existing.status))
            },
        }
    }

    async fn fetch_flag(&self, id: i64) -> Result<Option<FraudFlag>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flags::fetch_flag(id, &mut conn).await
    }

    async fn fetch_open_flags(&self, creator_id: &str) -> Result<Vec<FraudFlag>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flags::fetch_open_flags(creator_id, &mut conn).await
    }

    async fn fetch_all_open_flags(&self) -> Result<Vec<FraudFlag>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flags::fetch_all_open_flags(&mut conn).await
    }
}

//--------------------------------------   CreatorManagement    --------------------------------------------------------
impl CreatorManagement for SqliteDatabase {
    async fn upsert_creator(
        &self,
        creator_id: &str,
        subscription_price: MinorUnits,
    ) -> Result<CreatorUpdate, LedgerError> {
        if subscription_price.is_negative() {
            return Err(LedgerError::InvalidRequest(format!("Invalid subscription price {subscription_price}")));
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let previous = creators::touch_creator(creator_id, now, &mut tx).await?;
        let creator = creators::upsert_creator(creator_id, subscription_price, now, &mut tx).await?;
        tx.commit().await?;
        Ok(CreatorUpdate { creator, previous_price: previous.map(|c| c.subscription_price) })
    }

    async fn fetch_creator(&self, creator_id: &str) -> Result<Option<Creator>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        creators::fetch_creator(creator_id, &mut conn).await
    }

    async fn activate_creator(&self, creator_id: &str, at: DateTime<Utc>) -> Result<Creator, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let creator = creators::set_activated(creator_id, at, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| LedgerError::CreatorNotFound(creator_id.to_string()))?;
        tx.commit().await?;
        Ok(creator)
    }

    async fn suspend_creator(&self, creator_id: &str, reason: &str) -> Result<Creator, LedgerError> {
        self.set_suspension(creator_id, Some(reason)).await
    }

    async fn unsuspend_creator(&self, creator_id: &str) -> Result<Creator, LedgerError> {
        self.set_suspension(creator_id, None).await
    }

    async fn register_plan(&self, plan: SubscriptionPlan) -> Result<SubscriptionPlan, LedgerError> {
        if !(0..=10_000).contains(&plan.platform_fee_bps) {
            return Err(LedgerError::InvalidRequest(format!(
                "Platform fee of {} basis points is out of range",
                plan.platform_fee_bps
            )));
        }
        let mut tx = self.pool.begin().await?;
        let plan = creators::upsert_plan(plan, &mut tx).await?;
        tx.commit().await?;
        Ok(plan)
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        creators::fetch_plan(plan_id, &mut conn).await
    }
}

//--------------------------------------       ReviewQueue      --------------------------------------------------------
impl ReviewQueue for SqliteDatabase {
    async fn enqueue(&self, item: NewReviewItem) -> Result<ReviewItem, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let item = review_queue::insert_item(item, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Review item #{} queued ({}): {}", item.id, item.source, item.reason);
        Ok(item)
    }

    async fn open_items(&self) -> Result<Vec<ReviewItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        review_queue::fetch_open_items(&mut conn).await
    }

    async fn resolve(&self, id: i64, resolver: &str, note: &str) -> Result<ReviewItem, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let item = review_queue::resolve_item(id, resolver, note, Utc::now(), &mut tx)
            .await?
            .ok_or(LedgerError::ReviewItemNotFound(id))?;
        tx.commit().await?;
        Ok(item)
    }
}
