//! # Creator earnings server
//! The HTTP surface of the creator earnings gateway. It is responsible for:
//! * Starting Paystack and M-Pesa payments for subscriptions, and receiving the providers' callbacks.
//! * Handing provider outcomes to the reconciler, which posts creator earnings.
//! * Serving the creator dashboard: balances, earnings, fraud flags and payouts.
//! * Admin endpoints for creators, fraud flags, payouts, refunds and the review queue.
//! * Background workers for the clearing sweep and for reconciling payments whose callbacks never arrived.
//!
//! ## Configuration
//! The server is configured via `CEG_` environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/callbacks/paystack`, `/callbacks/mpesa`: provider callbacks. Signed (Paystack) or whitelisted (M-Pesa).
//! * `/api/...`: everything else. Requires a bearer token; admin routes also require the `admin` role.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod provider_routes;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
