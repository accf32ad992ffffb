//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction when several of them must succeed or
//! fail together, and call through to the functions without any other changes.
//!
//! Status changes are written as compare-and-set updates (`UPDATE ... WHERE status = <expected> RETURNING *`). A `None`
//! result means somebody else got there first, and it is up to the caller to decide what that means.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod balances;
pub mod caps;
pub mod creators;
pub mod earnings;
pub mod flags;
pub mod payments;
pub mod payouts;
pub mod reservations;
pub mod review_queue;

const SQLITE_DB_URL: &str = "sqlite://data/creator_earnings.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("CEG_DATABASE_URL").unwrap_or_else(|_| {
        info!("CEG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
