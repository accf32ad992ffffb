//! Clients for the payment providers the gateway talks to.
//!
//! Paystack (cards, bank transfers) and Safaricom Daraja (M-Pesa STK push). Both clients only move bytes and
//! provider-specific types around; mapping provider responses onto ledger outcomes is done by the server.
mod config;
mod data_objects;
mod error;
mod mpesa_api;
mod paystack_api;

pub mod helpers;
pub mod retry;

pub use config::{MpesaConfig, MpesaEnvironment, PaystackConfig, DEFAULT_PROVIDER_TIMEOUT};
pub use data_objects::*;
pub use error::ProviderApiError;
pub use mpesa_api::MpesaApi;
pub use paystack_api::PaystackApi;
pub use retry::{with_retry, RetryPolicy};
