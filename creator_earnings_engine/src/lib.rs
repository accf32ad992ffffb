//! Creator Earnings Engine
//!
//! The creator earnings engine turns subscription payments into creator earnings and creator earnings into payouts,
//! without ever losing or double-counting money. It is provider-agnostic: payment providers are reduced to
//! [`db_types::PaymentOutcome`]s before they reach the engine.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend, [`SqliteDatabase`]). The traits describe what a backend must
//!    provide; all multi-step money movements happen inside a single backend transaction. You should never need to
//!    touch the database directly. The exception is the data types in [`mod@db_types`], which are public.
//! 2. The public API ([`mod@cee_api`]): the reconciler, the earnings ledger, the fraud engine, the payout risk gate and
//!    workflow, the creator registry and the operator review queue.
//! 3. Domain events ([`mod@events`]). The APIs publish events after their transactions commit. Subscribers, such as
//!    the fraud checks or operator alerts, run outside those transactions and cannot affect them.
pub mod cee_api;
pub mod db_types;
pub mod events;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use cee_api::{
    creator_api::CreatorApi,
    fraud_api::FraudApi,
    ledger_api::LedgerApi,
    payout_api::PayoutApi,
    reconciler_api::ReconcilerApi,
    review_api::ReviewApi,
    risk_rules::{CapWindow, DenialReason, Eligibility, RiskPolicy, RiskSnapshot},
};
#[cfg(feature = "sqlite")]
pub use cee_api::fraud_api::fraud_event_hooks;
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{LedgerError, LedgerPolicy};
