//! SQLite backend for the creator earnings engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
