//! Error types for Delta Exchange integration.
//!
//! Provides typed errors for authentication, API communication and
//! validation failures, and their mapping onto the venue-neutral
//! [`GatewayError`].

use straddle_core::GatewayError;
use thiserror::Error;

/// Errors that can occur when interacting with Delta Exchange.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Authentication failed or credentials are missing.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// HMAC signing error.
    #[error("signing error: {0}")]
    Signing(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Invalid request parameters (bad symbol, identifier, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Order rejected by exchange.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Symbol, order or asset not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The venue answered but the payload lacked the requested value.
    #[error("missing data: {0}")]
    MissingData(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DeltaError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Returns true if the error indicates the request should be retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DeltaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeltaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<DeltaError> for GatewayError {
    fn from(err: DeltaError) -> Self {
        match err {
            DeltaError::Network(msg) => Self::Network(msg),
            DeltaError::Timeout(msg) => Self::Timeout(msg),
            DeltaError::RateLimit { retry_after_secs } => Self::rate_limit(retry_after_secs),
            DeltaError::Api {
                status_code,
                message,
            } => Self::api(status_code, message),
            DeltaError::OrderRejected(reason) => Self::rejected(reason),
            DeltaError::NotFound(what) => Self::NotFound(what),
            DeltaError::MissingData(what) => Self::Unavailable(what),
            DeltaError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            DeltaError::Serialization(msg) => Self::Serialization(msg),
            DeltaError::Authentication(msg)
            | DeltaError::Signing(msg)
            | DeltaError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

/// Result type alias for Delta operations.
pub type Result<T> = std::result::Result<T, DeltaError>;
