use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use creator_earnings_engine::{traits::LedgerError, DenialReason};
use provider_tools::ProviderApiError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state. {0}")]
    Conflict(String),
    #[error("{}", .0.description())]
    PayoutDenied(DenialReason),
    #[error("The payment provider could not be reached. {0}")]
    ProviderUnavailable(String),
    #[error("The payment provider refused the request. {0}")]
    ProviderError(String),
    #[error("{0} is not configured on this server")]
    ProviderNotConfigured(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::ForbiddenPeer => StatusCode::FORBIDDEN,
                AuthError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            },
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayoutDenied(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::PayoutDenied(reason) => json!({ "error": self.to_string(), "reason": reason.code() }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Request did not come from an allowed address.")]
    ForbiddenPeer,
    #[error("Webhook signature is invalid. {0}")]
    InvalidSignature(String),
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::PayoutDenied(reason) => Self::PayoutDenied(reason),
            e if e.is_not_found() => Self::NoRecordFound(e.to_string()),
            LedgerError::InvalidRequest(s) => Self::InvalidRequestBody(s),
            LedgerError::PaymentAlreadyExists(..)
            | LedgerError::Conflict { .. }
            | LedgerError::AmountMismatch { .. }
            | LedgerError::NotYetClearable(..)
            | LedgerError::InvalidEarningState(..)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::InvalidPayoutTransition(..)
            | LedgerError::FlagAlreadyClosed(..) => Self::Conflict(e.to_string()),
            e => Self::BackendError(e.to_string()),
        }
    }
}

impl From<ProviderApiError> for ServerError {
    fn from(e: ProviderApiError) -> Self {
        match e {
            ProviderApiError::NotConfigured(s) => Self::ProviderNotConfigured(s),
            ProviderApiError::InvalidAmount(s) => Self::InvalidRequestBody(s),
            e if e.is_transient() => Self::ProviderUnavailable(e.to_string()),
            ProviderApiError::Unavailable(s) => Self::ProviderUnavailable(s),
            e => Self::ProviderError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::MessageBody;

    use super::*;

    #[test]
    fn denials_carry_a_stable_code() {
        let err = ServerError::from(LedgerError::PayoutDenied(DenialReason::CapExceeded));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.error_response().into_body().try_into_bytes().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["reason"], "cap_exceeded");
        assert_eq!(body["error"], "The requested amount exceeds this week's payout limit");
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let status = |e: LedgerError| ServerError::from(e).status_code();
        assert_eq!(status(LedgerError::PayoutNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status(LedgerError::CreatorNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(LedgerError::InvalidRequest("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(LedgerError::DatabaseError("gone".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(LedgerError::LedgerInvariantViolation("drift".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provider_errors_map_to_statuses() {
        let status = |e: ProviderApiError| ServerError::from(e).status_code();
        assert_eq!(status(ProviderApiError::Timeout("slow".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ProviderApiError::Unavailable("gave up".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ProviderApiError::Rejected("nope".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(ProviderApiError::InvalidAmount("1.50".into())), StatusCode::BAD_REQUEST);
    }
}
