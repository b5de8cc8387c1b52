//! # Cache Error Types
//!
//! Every failure the engine can report, grouped by how callers must treat it.

use thiserror::Error;

/// How an error should be handled by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network timeout or temporary server failure; eligible for retry
    Transient,
    /// Validation or malformed request; never retried
    Permanent,
    /// Disk, serialization or keystore trouble; treated as a cache miss
    Storage,
    /// Authentication failure or missing key; always surfaced
    Cryptographic,
    /// The caller gave up; not a failure and must not be reported as one
    Cancelled,
}

/// Marker produced when a cancellation token fires mid-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Errors that can occur inside the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Remote call failed in a way that may succeed on retry.
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// Remote call rejected the request; retrying will not help.
    #[error("Remote request rejected: {0}")]
    Permanent(String),

    /// The rate limiter cannot admit the call within its bounded wait.
    #[error("Rate limit cannot admit request within {max_wait_ms} ms (window {window_ms} ms, max {max_requests} requests)")]
    RateLimited {
        max_requests: u32,
        window_ms: u64,
        max_wait_ms: u64,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Pagination cursor names a column outside the allow-list.
    #[error("Column '{column}' is not an allowed cursor column")]
    DisallowedColumn { column: String },

    /// Argument or configuration value out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    // ========================================================================
    // Storage Errors
    // ========================================================================
    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The platform keystore could not be reached.
    #[error("Keystore unavailable: {0}")]
    KeystoreUnavailable(String),

    // ========================================================================
    // Cryptographic Errors
    // ========================================================================
    /// Ciphertext failed authentication: tampered, truncated, or wrong key.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key bytes were missing or malformed.
    #[error("Encryption key unavailable: {0}")]
    KeyNotFound(String),

    // ========================================================================
    // Control Flow
    // ========================================================================
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for CacheError {
    fn from(_: Cancelled) -> Self {
        CacheError::Cancelled
    }
}

impl From<bridge_traits::BridgeError> for CacheError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        CacheError::KeystoreUnavailable(err.to_string())
    }
}

impl CacheError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CacheError::Transient(_) | CacheError::RateLimited { .. } => ErrorCategory::Transient,
            CacheError::Permanent(_)
            | CacheError::DisallowedColumn { .. }
            | CacheError::InvalidArgument(_)
            | CacheError::Config(_) => ErrorCategory::Permanent,
            CacheError::Storage(_)
            | CacheError::Io(_)
            | CacheError::Serialization(_)
            | CacheError::KeystoreUnavailable(_) => ErrorCategory::Storage,
            CacheError::DecryptionFailed(_)
            | CacheError::EncryptionFailed(_)
            | CacheError::KeyNotFound(_) => ErrorCategory::Cryptographic,
            CacheError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Returns `true` if the operation may succeed when retried.
    ///
    /// A rate-limit rejection is not retried by the retry loop; the limiter
    /// already waited as long as it is allowed to.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Transient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }

    pub fn is_storage(&self) -> bool {
        self.category() == ErrorCategory::Storage
    }

    pub fn is_cryptographic(&self) -> bool {
        self.category() == ErrorCategory::Cryptographic
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            CacheError::Transient("timeout".into()).category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            CacheError::DisallowedColumn {
                column: "title".into()
            }
            .category(),
            ErrorCategory::Permanent
        );
        assert_eq!(
            CacheError::Io(std::io::Error::other("disk full")).category(),
            ErrorCategory::Storage
        );
        assert_eq!(
            CacheError::DecryptionFailed("tag mismatch".into()).category(),
            ErrorCategory::Cryptographic
        );
        assert_eq!(CacheError::Cancelled.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn test_transient_predicate() {
        assert!(CacheError::Transient("503".into()).is_transient());
        assert!(!CacheError::Permanent("400".into()).is_transient());
        assert!(!CacheError::Cancelled.is_transient());
        assert!(!CacheError::RateLimited {
            max_requests: 0,
            window_ms: 1000,
            max_wait_ms: 0
        }
        .is_transient());
    }

    #[test]
    fn test_conversions() {
        let err: CacheError = Cancelled.into();
        assert!(err.is_cancelled());

        let err: CacheError = bridge_traits::BridgeError::Keystore("locked".into()).into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("locked"));
    }
}
