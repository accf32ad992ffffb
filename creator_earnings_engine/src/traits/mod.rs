//! # Backend contracts
//!
//! The traits in this module define what a storage backend has to provide for the creator earnings engine. The
//! [`crate::SqliteDatabase`] backend implements all of them.
//!
//! * [`PaymentReconciliation`] records payment attempts and applies provider outcomes to them.
//! * [`EarningsLedger`] posts, clears and refunds earnings and owns creator balances.
//! * [`PayoutManagement`] runs the payout workflow, including the atomic check-and-reserve at creation.
//! * [`FraudManagement`] stores fraud flags and serves the data the heuristics need.
//! * [`CreatorManagement`] keeps creator activation, suspension, pricing and plans.
//! * [`ReviewQueue`] collects failures that need an operator.
//!
//! Backends never publish events or make network calls. That is left to the APIs in [`crate::cee_api`].
mod creator_management;
mod data_objects;
mod earnings_ledger;
mod errors;
mod fraud_management;
mod payment_reconciliation;
mod payout_management;
mod review_queue;

pub use creator_management::CreatorManagement;
pub use data_objects::{
    CreatorUpdate,
    FeeSplit,
    LedgerPolicy,
    PaymentStatusChange,
    ReservationToken,
    SweepResult,
    DEFAULT_CLEARING_DELAY_DAYS,
    DEFAULT_PLATFORM_FEE_BPS,
};
pub use earnings_ledger::EarningsLedger;
pub use errors::LedgerError;
pub use fraud_management::FraudManagement;
pub use payment_reconciliation::PaymentReconciliation;
pub use payout_management::PayoutManagement;
pub use review_queue::ReviewQueue;
