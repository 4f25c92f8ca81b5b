//! # Error Handling
//!
//! Error types for every cipherlab operation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Validation Errors (100-199)                                       │
//! │  │   ├── InvalidInput          - Malformed request field               │
//! │  │   ├── InvalidKey            - Unparsable key / wrong key length     │
//! │  │   ├── InvalidEncoding       - Bad base64 / hex                      │
//! │  │   └── UnsupportedKeySize    - Size outside the allowed set          │
//! │  │                                                                      │
//! │  ├── Crypto Errors (200-299)                                           │
//! │  │   ├── MessageTooLarge       - RSA-OAEP capacity exceeded            │
//! │  │   ├── InvalidPadding        - PKCS#7 check failed (internal only)   │
//! │  │   ├── DecryptionFailed      - Generic decrypt / unwrap failure      │
//! │  │   ├── EncryptionFailed      - Primitive refused to encrypt          │
//! │  │   ├── SigningFailed         - Primitive refused to sign             │
//! │  │   └── KeyGenerationFailed   - RSA keygen failed                     │
//! │  │                                                                      │
//! │  ├── Access Errors (300-399)                                           │
//! │  │   ├── Unauthenticated       - No caller identity                    │
//! │  │   ├── Forbidden             - Requester is not the recipient        │
//! │  │   ├── MissingKey            - AES message without shared key        │
//! │  │   └── NoKeyPair             - User has no stored key pair           │
//! │  │                                                                      │
//! │  ├── Storage Errors (400-499)                                          │
//! │  │   ├── MessageNotFound       - Unknown message id                    │
//! │  │   ├── NotFound              - Unknown route / resource              │
//! │  │   └── Storage               - Backend failure (retryable)           │
//! │  │                                                                      │
//! │  ├── Execution Errors (500-599)                                        │
//! │  │   ├── TimedOut              - Key generation exceeded its budget    │
//! │  │   └── WorkerUnavailable     - Worker pool closed / task panicked    │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                                         │
//! │      ├── Internal                                                      │
//! │      └── SerializationError                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Crypto failures never carry byte-level detail. `InvalidPadding` only
//! exists inside the symmetric cipher; [`Error::sanitized`] folds it into
//! `DecryptionFailed` before anything leaves the engine.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for cipherlab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cipherlab
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// A request field is missing or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A key could not be parsed or has the wrong length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Base64 or hex payload could not be decoded
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Key size outside the allowed set for the algorithm
    #[error("Unsupported key size: {0} bits")]
    UnsupportedKeySize(u32),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// Plaintext exceeds the RSA-OAEP capacity of the key
    #[error("Message too large: {size} bytes (max {max} bytes for this key)")]
    MessageTooLarge {
        /// Plaintext length in bytes
        size: usize,
        /// Capacity of the key in bytes
        max: usize,
    },

    /// Block padding did not verify
    #[error("Invalid padding")]
    InvalidPadding,

    /// Decryption or key unwrapping failed
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// RSA key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    // ========================================================================
    // Access Errors (300-399)
    // ========================================================================

    /// No authenticated caller was supplied
    #[error("Authentication required")]
    Unauthenticated,

    /// The requester is not allowed to perform this operation
    #[error("Forbidden: only the recipient can decrypt this message")]
    Forbidden,

    /// An AES message was opened without its shared key
    #[error("A shared key is required to decrypt this message")]
    MissingKey,

    /// The user has no key pair on file
    #[error("No key pair on file for user: {0}")]
    NoKeyPair(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Message not found
    #[error("Message not found.")]
    MessageNotFound,

    /// Route or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Execution Errors (500-599)
    // ========================================================================

    /// Operation exceeded its time budget
    #[error("Operation timed out: {0}")]
    TimedOut(String),

    /// The worker pool could not run the task
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Numeric error code
    ///
    /// - 100-199: Validation
    /// - 200-299: Crypto
    /// - 300-399: Access
    /// - 400-499: Storage
    /// - 500-599: Execution
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => 100,
            Error::InvalidKey(_) => 101,
            Error::InvalidEncoding(_) => 102,
            Error::UnsupportedKeySize(_) => 103,

            Error::MessageTooLarge { .. } => 200,
            Error::InvalidPadding => 201,
            Error::DecryptionFailed => 202,
            Error::EncryptionFailed(_) => 203,
            Error::SigningFailed(_) => 204,
            Error::KeyGenerationFailed(_) => 205,

            Error::Unauthenticated => 300,
            Error::Forbidden => 301,
            Error::MissingKey => 302,
            Error::NoKeyPair(_) => 303,

            Error::MessageNotFound => 400,
            Error::NotFound(_) => 401,
            Error::Storage(_) => 402,

            Error::TimedOut(_) => 500,
            Error::WorkerUnavailable(_) => 501,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Stable machine-readable kind, independent of the message text
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidKey(_)
            | Error::InvalidEncoding(_)
            | Error::UnsupportedKeySize(_) => "validation_error",
            Error::MessageTooLarge { .. } => "message_too_large",
            Error::InvalidPadding => "invalid_padding",
            Error::DecryptionFailed => "decryption_failed",
            Error::EncryptionFailed(_) => "encryption_failed",
            Error::SigningFailed(_) => "signing_failed",
            Error::KeyGenerationFailed(_) => "key_generation_failed",
            Error::Unauthenticated => "unauthenticated",
            Error::Forbidden => "forbidden",
            Error::MissingKey => "missing_key",
            Error::NoKeyPair(_) => "no_key_pair",
            Error::MessageNotFound | Error::NotFound(_) => "not_found",
            Error::Storage(_) => "storage_error",
            Error::TimedOut(_) => "timed_out",
            Error::WorkerUnavailable(_) => "worker_unavailable",
            Error::Internal(_) | Error::SerializationError(_) => "internal",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only infrastructure failures qualify. A wrong key stays wrong no
    /// matter how often it is retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::TimedOut(_) | Error::WorkerUnavailable(_)
        )
    }

    /// HTTP-style status for the transport layer
    pub fn status(&self) -> u16 {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidKey(_)
            | Error::InvalidEncoding(_)
            | Error::UnsupportedKeySize(_)
            | Error::MissingKey
            | Error::NoKeyPair(_)
            | Error::InvalidPadding
            | Error::DecryptionFailed => 400,
            Error::Unauthenticated => 401,
            Error::Forbidden => 403,
            Error::MessageNotFound | Error::NotFound(_) => 404,
            Error::MessageTooLarge { .. } => 413,
            Error::Storage(_) | Error::WorkerUnavailable(_) => 503,
            Error::TimedOut(_) => 504,
            Error::EncryptionFailed(_)
            | Error::SigningFailed(_)
            | Error::KeyGenerationFailed(_)
            | Error::Internal(_)
            | Error::SerializationError(_) => 500,
        }
    }

    /// Collapse padding failures into the generic decryption failure
    pub fn sanitized(self) -> Self {
        match self {
            Error::InvalidPadding => Error::DecryptionFailed,
            other => other,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidEncoding(format!("invalid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::WorkerUnavailable(err.to_string())
    }
}

// ============================================================================
// WIRE ERROR REPRESENTATION
// ============================================================================

/// Serialisable error returned across the API boundary
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Numeric error code
    pub code: i32,
    /// Stable error kind
    pub kind: &'static str,
    /// Human-readable, key-free message
    pub message: String,
    /// Whether the caller may retry
    pub recoverable: bool,
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        let err = err.sanitized();
        Self {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidInput("x".into()).code(), 100);
        assert_eq!(Error::MessageTooLarge { size: 300, max: 190 }.code(), 200);
        assert_eq!(Error::Forbidden.code(), 301);
        assert_eq!(Error::MessageNotFound.code(), 400);
        assert_eq!(Error::TimedOut("keygen".into()).code(), 500);
        assert_eq!(Error::Internal("x".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::Storage("locked".into()).is_recoverable());
        assert!(Error::TimedOut("keygen".into()).is_recoverable());
        assert!(!Error::DecryptionFailed.is_recoverable());
        assert!(!Error::Forbidden.is_recoverable());
    }

    #[test]
    fn test_padding_is_folded_at_the_boundary() {
        assert!(matches!(Error::InvalidPadding.sanitized(), Error::DecryptionFailed));

        let body: ErrorBody = Error::InvalidPadding.into();
        assert_eq!(body.kind, "decryption_failed");
        assert_eq!(body.message, "Decryption failed");
    }

    #[test]
    fn test_message_too_large_message() {
        let err = Error::MessageTooLarge { size: 300, max: 190 };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("190"));
        assert_eq!(err.status(), 413);
    }
}
