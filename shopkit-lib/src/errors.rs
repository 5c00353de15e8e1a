//! Error types for Shopkit operations.
//!
//! Verification failures and catalog misses are not errors at the API
//! boundary: they are logged and surfaced as
//! [`StoreEvent::UnexpectedError`](crate::events::StoreEvent::UnexpectedError).
//! `ShopkitError` covers precondition failures (not initialized, store not
//! open), broken collaborators (storage, billing transport), and bad input.

use crate::billing::BillingResponse;
use crate::ProductId;

/// Error codes for FFI and host-application integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ShopkitErrorCode {
    /// Controller was used before `initialize` succeeded
    NotInitialized = 1000,
    /// `initialize` called twice
    AlreadyInitialized = 1001,
    /// No public key supplied or stored
    MissingPublicKey = 1002,
    /// No custom secret supplied
    MissingCustomSecret = 1003,
    /// Public key could not be decoded
    MalformedPublicKey = 1004,
    /// Custom secret does not open the stored values
    SecretMismatch = 1005,
    /// Operation requires an open store session
    StoreNotOpen = 2000,
    /// `store_opening` called on an open session
    StoreAlreadyOpen = 2001,
    /// Billing is not available on this device/session
    BillingUnavailable = 3000,
    /// Platform billing returned a failure
    Billing = 3001,
    /// Billing call timed out
    Timeout = 3002,
    /// Product is not in the catalog
    ItemNotFound = 4000,
    /// Item rejected a grant or revoke
    Economy = 4001,
    /// Persistent storage failed
    Storage = 6000,
    /// Invalid configuration
    Config = 7000,
    /// Serialization error
    Serialization = 7001,
}

/// Error type for Shopkit operations.
#[derive(Debug, thiserror::Error)]
pub enum ShopkitError {
    /// The controller has not been initialized.
    #[error("store controller is not initialized")]
    NotInitialized,

    /// The controller was already initialized.
    #[error("store controller is already initialized")]
    AlreadyInitialized,

    /// No public key was supplied and none is stored.
    #[error("public key is missing, can't initialize store")]
    MissingPublicKey,

    /// No custom secret was supplied.
    #[error("custom secret is missing, can't initialize store")]
    MissingCustomSecret,

    /// The custom secret differs from the one the stored values were
    /// written with.
    #[error("custom secret does not match stored store data")]
    SecretMismatch,

    /// The public key is not a valid base64 RSA public key.
    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    /// The store session is not open.
    #[error("store is not open")]
    StoreNotOpen,

    /// The store session is already open.
    #[error("store is already open")]
    StoreAlreadyOpen,

    /// Billing is not supported in the current session.
    #[error("billing unavailable: {0}")]
    BillingUnavailable(String),

    /// The billing service reported a failure.
    #[error("billing error ({response}): {message}")]
    Billing {
        /// Platform response code
        response: BillingResponse,
        /// Failure description
        message: String,
    },

    /// A billing call did not complete in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// No purchasable item exists for the product id.
    #[error("no purchasable item with product id {0}")]
    ItemNotFound(ProductId),

    /// The economy model rejected a balance change.
    #[error("economy update failed: {0}")]
    Economy(String),

    /// Persistent storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ShopkitError {
    /// Get the error code for FFI/host integration.
    pub fn code(&self) -> ShopkitErrorCode {
        match self {
            Self::NotInitialized => ShopkitErrorCode::NotInitialized,
            Self::AlreadyInitialized => ShopkitErrorCode::AlreadyInitialized,
            Self::MissingPublicKey => ShopkitErrorCode::MissingPublicKey,
            Self::MissingCustomSecret => ShopkitErrorCode::MissingCustomSecret,
            Self::MalformedPublicKey(_) => ShopkitErrorCode::MalformedPublicKey,
            Self::SecretMismatch => ShopkitErrorCode::SecretMismatch,
            Self::StoreNotOpen => ShopkitErrorCode::StoreNotOpen,
            Self::StoreAlreadyOpen => ShopkitErrorCode::StoreAlreadyOpen,
            Self::BillingUnavailable(_) => ShopkitErrorCode::BillingUnavailable,
            Self::Billing { .. } => ShopkitErrorCode::Billing,
            Self::Timeout { .. } => ShopkitErrorCode::Timeout,
            Self::ItemNotFound(_) => ShopkitErrorCode::ItemNotFound,
            Self::Economy(_) => ShopkitErrorCode::Economy,
            Self::Storage(_) => ShopkitErrorCode::Storage,
            Self::Config(_) => ShopkitErrorCode::Config,
            Self::Serialization(_) => ShopkitErrorCode::Serialization,
        }
    }

    /// Get the error message as an owned String (useful for FFI).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true if this error is potentially recoverable by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Storage(_) => true,
            Self::Billing { response, .. } => response.is_transient(),
            _ => false,
        }
    }

    /// Create a billing error from a platform response.
    pub fn billing(response: BillingResponse, message: impl Into<String>) -> Self {
        Self::Billing {
            response,
            message: message.into(),
        }
    }

    /// Create a storage error from any error type.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ShopkitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ShopkitError::NotInitialized.code(),
            ShopkitErrorCode::NotInitialized
        );
        assert_eq!(
            ShopkitError::ItemNotFound("gems".into()).code(),
            ShopkitErrorCode::ItemNotFound
        );
        assert_eq!(
            ShopkitError::SecretMismatch.code(),
            ShopkitErrorCode::SecretMismatch
        );
        assert_eq!(ShopkitErrorCode::SecretMismatch as i32, 1005);
        assert_eq!(ShopkitErrorCode::Serialization as i32, 7001);
    }

    #[test]
    fn test_retryable() {
        let timeout = ShopkitError::Timeout {
            operation: "query_inventory".to_string(),
            timeout_ms: 30_000,
        };
        assert!(timeout.is_retryable());
        assert!(ShopkitError::billing(BillingResponse::ServiceUnavailable, "down").is_retryable());
        assert!(!ShopkitError::billing(BillingResponse::DeveloperError, "bad sku").is_retryable());
        assert!(!ShopkitError::MissingPublicKey.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ShopkitError::billing(BillingResponse::ItemUnavailable, "not for sale");
        assert!(err.to_string().contains("not for sale"));
        assert!(err.message().contains("billing error"));
        let err = ShopkitError::ItemNotFound("coins_100".into());
        assert!(err.to_string().contains("coins_100"));
    }
}
