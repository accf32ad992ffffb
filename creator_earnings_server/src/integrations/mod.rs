//! Translation between the payment providers' wire formats and the engine's [`PaymentOutcome`]s, plus outbound
//! operator alerts.
//!
//! [`PaymentOutcome`]: creator_earnings_engine::db_types::PaymentOutcome
pub mod alerts;
pub mod mpesa;
pub mod paystack;
