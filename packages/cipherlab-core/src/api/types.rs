//! Request and response shapes of the JSON API.

use serde::Deserialize;

use crate::crypto::Algorithm;
use crate::error::ErrorBody;
use crate::messaging::EncryptionType;

/// A response ready for the transport layer
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP-style status
    pub status: u16,
    /// JSON body
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// 200 with `body`
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    /// 201 with `body`
    pub fn created(body: serde_json::Value) -> Self {
        Self { status: 201, body }
    }

    /// Error response carrying an [`ErrorBody`]
    pub fn error(err: crate::error::Error) -> Self {
        let err = err.sanitized();
        let status = err.status();
        let body = ErrorBody::from(err);
        Self {
            status,
            body: serde_json::json!({ "error": body }),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// CRYPTO REQUESTS
// ============================================================================

/// `POST /crypto/keys/generate`
#[derive(Debug, Deserialize)]
pub struct GenerateKeysRequest {
    /// `AES` or `RSA`
    pub algorithm: Algorithm,
    /// Key size in bits; the configured default when absent
    pub key_size: Option<u32>,
}

/// `POST /crypto/aes/encrypt`
#[derive(Deserialize)]
pub struct AesEncryptRequest {
    /// Text to encrypt
    pub plaintext: String,
    /// Key size in bits; the configured default when absent
    pub key_size: Option<u32>,
    /// Base64 key; a fresh one is generated when absent
    pub key: Option<String>,
}

/// `POST /crypto/aes/decrypt`
#[derive(Deserialize)]
pub struct AesDecryptRequest {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// Base64 AES key
    pub key: String,
}

/// `POST /crypto/rsa/encrypt`
#[derive(Debug, Deserialize)]
pub struct RsaEncryptRequest {
    /// Text to encrypt
    pub plaintext: String,
    /// PEM or base64-wrapped PEM
    pub public_key: String,
}

/// `POST /crypto/rsa/decrypt`
#[derive(Deserialize)]
pub struct RsaDecryptRequest {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// PEM or base64-wrapped PEM
    pub private_key: String,
}

/// `POST /crypto/rsa/sign`
#[derive(Deserialize)]
pub struct SignRequest {
    /// Text that is signed
    pub message: String,
    /// PEM or base64-wrapped PEM
    pub private_key: String,
}

/// `POST /crypto/rsa/verify`
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Text that is signed
    pub message: String,
    /// Base64 signature
    pub signature: String,
    /// PEM or base64-wrapped PEM
    pub public_key: String,
}

// ============================================================================
// MESSAGING REQUESTS
// ============================================================================

/// `POST /messages/send`
#[derive(Deserialize)]
pub struct SendMessageRequest {
    /// Receiving user
    pub recipient_username: String,
    /// Text to encrypt
    pub plaintext: String,
    /// `AES`, `RSA` or `HYBRID`
    pub encryption_type: EncryptionType,
    /// Base64 AES key for AES messages
    pub shared_key: Option<String>,
}

/// `POST /messages/{id}/decrypt`
#[derive(Default, Deserialize)]
pub struct DecryptMessageRequest {
    /// Base64 AES key for AES messages
    pub shared_key: Option<String>,
}

/// `POST /users/keys`
#[derive(Debug, Default, Deserialize)]
pub struct UserKeysRequest {
    /// Key size in bits; the configured default when absent
    pub key_size: Option<u32>,
}
