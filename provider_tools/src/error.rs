use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Provider is not configured: {0}")]
    NotConfigured(String),
    #[error("Could not connect to the provider: {0}")]
    ConnectionError(String),
    #[error("Request to the provider timed out: {0}")]
    Timeout(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The provider rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderApiError {
    /// Errors worth retrying. Everything else is a definitive answer from the provider (or a bug on our side).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout(_) => true,
            Self::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::ConnectionError(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else if let Some(status) = e.status() {
            Self::QueryError { status: status.as_u16(), message: e.to_string() }
        } else {
            Self::RestResponseError(e.to_string())
        }
    }
}
