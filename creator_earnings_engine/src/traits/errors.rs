use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    cee_api::risk_rules::DenialReason,
    db_types::{EarningStatus, FlagStatus, InvalidTransition, MinorUnits, PaymentStatus, Provider},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No {0} payment with reference {1}")]
    PaymentNotFound(Provider, String),
    #[error("A {0} payment with reference {1} already exists")]
    PaymentAlreadyExists(Provider, String),
    #[error("Payment {reference} is already {current} and cannot become {attempted}")]
    Conflict { reference: String, current: PaymentStatus, attempted: PaymentStatus },
    #[error("Payment {reference} was for {expected} but the provider reported {reported}")]
    AmountMismatch { reference: String, expected: MinorUnits, reported: MinorUnits },
    #[error("Earning #{0} does not exist")]
    EarningNotFound(i64),
    #[error("Earning #{0} only clears at {1}")]
    NotYetClearable(i64, DateTime<Utc>),
    #[error("Earning #{0} is {1}, which does not allow this operation")]
    InvalidEarningState(i64, EarningStatus),
    #[error("Creator {creator_id} has {available} available but {requested} was requested")]
    InsufficientFunds { creator_id: String, requested: MinorUnits, available: MinorUnits },
    #[error("Payout denied: {0}")]
    PayoutDenied(DenialReason),
    #[error("Payout #{0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout #{0}: {1}")]
    InvalidPayoutTransition(i64, InvalidTransition),
    #[error("Creator {0} does not exist")]
    CreatorNotFound(String),
    #[error("Fraud flag #{0} does not exist")]
    FlagNotFound(i64),
    #[error("Fraud flag #{0} is already {1}")]
    FlagAlreadyClosed(i64, FlagStatus),
    #[error("Review item #{0} does not exist or is already resolved")]
    ReviewItemNotFound(i64),
    #[error("Ledger invariant violated: {0}")]
    LedgerInvariantViolation(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PaymentNotFound(..)
                | Self::EarningNotFound(_)
                | Self::PayoutNotFound(_)
                | Self::CreatorNotFound(_)
                | Self::FlagNotFound(_)
                | Self::ReviewItemNotFound(_)
        )
    }

    /// Errors that an operator has to look at. These are never retried automatically.
    pub fn needs_operator(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AmountMismatch { .. } | Self::LedgerInvariantViolation(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(err) if err.is_check_violation() => {
                Self::LedgerInvariantViolation(format!("A balance constraint was violated. {err}"))
            },
            _ => Self::DatabaseError(e.to_string()),
        }
    }
}
