//! HMAC-SHA256 authentication for the Delta Exchange API.
//!
//! The signature is the hex-encoded HMAC-SHA256 of
//! `method + timestamp + path + query_string + body`, keyed by the API
//! secret. `timestamp` is Unix seconds and `query_string` includes its
//! leading `?` when present.
//!
//! # Security
//!
//! - Credentials are loaded from environment variables
//! - The secret is held in a `SecretString` and NEVER logged
//! - The API key is zeroized on drop

use crate::error::{DeltaError, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Configuration
// =============================================================================

/// Names of the environment variables holding the credentials.
#[derive(Debug, Clone)]
pub struct DeltaAuthConfig {
    /// Environment variable name for the API key.
    pub api_key_env: String,

    /// Environment variable name for the API secret.
    pub api_secret_env: String,
}

impl Default for DeltaAuthConfig {
    fn default() -> Self {
        Self {
            api_key_env: "DELTA_API_KEY".to_string(),
            api_secret_env: "DELTA_API_SECRET".to_string(),
        }
    }
}

impl DeltaAuthConfig {
    /// Sets custom environment variable names.
    #[must_use]
    pub fn with_env_vars(
        mut self,
        api_key_env: impl Into<String>,
        api_secret_env: impl Into<String>,
    ) -> Self {
        self.api_key_env = api_key_env.into();
        self.api_secret_env = api_secret_env.into();
        self
    }
}

// =============================================================================
// Signed Headers
// =============================================================================

/// Headers required for authenticated Delta API requests.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// `api-key` header.
    pub api_key: String,

    /// `signature` header (hex).
    pub signature: String,

    /// `timestamp` header (Unix seconds).
    pub timestamp: String,
}

impl SignedHeaders {
    /// Returns headers as tuples for reqwest.
    #[must_use]
    pub fn as_tuples(&self) -> [(&'static str, &str); 3] {
        [
            ("api-key", &self.api_key),
            ("signature", &self.signature),
            ("timestamp", &self.timestamp),
        ]
    }
}

// =============================================================================
// DeltaAuth
// =============================================================================

/// Request signer for the Delta Exchange API.
pub struct DeltaAuth {
    api_key: String,
    api_secret: SecretString,
}

impl std::fmt::Debug for DeltaAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaAuth")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

impl Drop for DeltaAuth {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl DeltaAuth {
    /// Creates a new signer from an API key and secret.
    ///
    /// # Errors
    /// Returns error if either credential is empty.
    pub fn new(api_key: impl Into<String>, api_secret: SecretString) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() || api_secret.expose_secret().is_empty() {
            return Err(DeltaError::Authentication(
                "API key and secret must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            api_secret,
        })
    }

    /// Creates a new signer from environment variables.
    ///
    /// # Errors
    /// Returns error if environment variables are missing or empty.
    pub fn from_env(config: &DeltaAuthConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DeltaError::Configuration(format!(
                "missing environment variable: {}",
                config.api_key_env
            ))
        })?;

        let api_secret = std::env::var(&config.api_secret_env).map_err(|_| {
            DeltaError::Configuration(format!(
                "missing environment variable: {}",
                config.api_secret_env
            ))
        })?;

        Self::new(api_key, SecretString::from(api_secret))
    }

    /// Returns the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Signs a request with the current time.
    ///
    /// # Errors
    /// Returns error if the clock is unavailable or signing fails.
    pub fn sign_request(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
    ) -> Result<SignedHeaders> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DeltaError::Signing(format!("failed to get timestamp: {e}")))?
            .as_secs();

        self.sign_request_with_timestamp(method, path, query, body, timestamp)
    }

    /// Signs a request with a specific timestamp (useful for testing).
    ///
    /// # Errors
    /// Returns error if the HMAC key is rejected.
    pub fn sign_request_with_timestamp(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
        timestamp_secs: u64,
    ) -> Result<SignedHeaders> {
        let timestamp = timestamp_secs.to_string();
        let message = format!("{method}{timestamp}{path}{query}{body}");

        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| DeltaError::Signing(format!("invalid key length: {e}")))?;
        mac.update(message.as_bytes());

        Ok(SignedHeaders {
            api_key: self.api_key.clone(),
            signature: hex::encode(mac.finalize().into_bytes()),
            timestamp,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
