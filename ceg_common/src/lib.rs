//! Primitives shared by the creator earnings engine, the provider clients and the server.
mod minor_units;

pub mod helpers;
pub mod op;
mod secret;

pub use minor_units::{MinorUnits, MinorUnitsConversionError, BASIS_POINTS_DENOMINATOR};
pub use secret::Secret;
