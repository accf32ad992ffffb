//! # Creator earnings engine public API
//!
//! The `cee_api` module exposes the programmatic API for the creator earnings engine. The API is modular, so that
//! clients can pick the parts they need.
//!
//! * [`reconciler_api`] records payment attempts and applies provider outcomes to them, posting earnings on success.
//! * [`ledger_api`] clears and refunds earnings, reports and verifies balances.
//! * [`fraud_api`] runs the fraud heuristics and manages flags.
//! * [`payout_api`] is the payout risk gate and the payout workflow.
//! * [`creator_api`] registers, activates and suspends creators and their plans.
//! * [`review_api`] is the operator review queue.
//!
//! [`risk_rules`] and [`fraud_rules`] hold the pure decision functions the APIs are built on.
//!
//! # API usage
//!
//! Every API is created by supplying a database backend that implements the backend traits it needs, plus the event
//! producers it should publish to.
//!
//! ```rust,ignore
//! use creator_earnings_engine::{events::EventProducers, LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = LedgerApi::new(db, EventProducers::default());
//! let balance = api.balance("alice").await?;
//! ```
pub mod creator_api;
pub mod fraud_api;
pub mod fraud_rules;
pub mod ledger_api;
pub mod payout_api;
pub mod reconciler_api;
pub mod review_api;
pub mod risk_rules;
