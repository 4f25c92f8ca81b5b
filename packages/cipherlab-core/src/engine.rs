//! # Cipher Engine
//!
//! Async entry point for every operation. The engine owns the worker pool
//! and the message service, runs CPU-bound work off the caller's task and
//! writes the audit trail.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           CIPHER ENGINE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   api::dispatch ──► CipherEngine ──► CryptoPool ──► crypto::*          │
//! │                          │                              │               │
//! │                          │                              ▼               │
//! │                          │                        MessageService        │
//! │                          │                              │               │
//! │                          ▼                              ▼               │
//! │                     audit::record              MessageStore/KeyStore    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors leaving the engine are sanitized: padding failures surface as
//! `DecryptionFailed`.

use std::sync::Arc;

use serde::Serialize;

use crate::audit::{self, AuditEntry, AuditEvent};
use crate::config::EngineConfig;
use crate::crypto::{
    self, asymmetric, signing, symmetric, AesKeySize, Algorithm, AsymmetricCiphertext, Decrypted,
    RsaKeySize, SecretPem, SignatureOutput, SymmetricCiphertext, SymmetricKey, Verification,
};
use crate::error::{Error, Result};
use crate::messaging::{
    DecryptedMessage, EncryptionType, Mailbox, MessageDetail, MessageService, SendReceipt,
};
use crate::pool::CryptoPool;
use crate::storage::{Database, KeyStore, MemoryStore, MessageStore, StoredPublicKey};

/// Freshly generated key material
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedKeys {
    /// `AES` or `RSA`
    pub algorithm: Algorithm,
    /// Key size in bits
    pub key_size: u32,
    /// Base64 AES key (AES only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<SymmetricKey>,
    /// SPKI PEM (RSA only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// PKCS#8 PEM (RSA only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<SecretPem>,
}

/// The cipherlab engine
pub struct CipherEngine {
    config: EngineConfig,
    pool: CryptoPool,
    service: Arc<MessageService>,
}

impl CipherEngine {
    /// Create an engine, opening SQLite at `config.database_path` or keeping
    /// everything in memory when no path is set
    pub fn new(config: EngineConfig) -> Result<Self> {
        match config.database_path.as_deref() {
            Some(path) => {
                let db = Arc::new(Database::open(Some(path))?);
                tracing::info!("Engine using SQLite store at {}", path);
                Ok(Self::with_stores(config, db.clone(), db))
            }
            None => {
                let store = Arc::new(MemoryStore::new());
                tracing::info!("Engine using in-memory store");
                Ok(Self::with_stores(config, store.clone(), store))
            }
        }
    }

    /// Create an engine over caller-provided stores
    pub fn with_stores(
        config: EngineConfig,
        messages: Arc<dyn MessageStore>,
        keys: Arc<dyn KeyStore>,
    ) -> Self {
        let pool = CryptoPool::new(config.max_concurrent_ops, config.keygen_timeout);
        let service = MessageService::new(messages, keys).with_preview_len(config.preview_len);
        Self {
            config,
            pool,
            service: Arc::new(service),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The worker pool
    pub fn pool(&self) -> &CryptoPool {
        &self.pool
    }

    // ========================================================================
    // STANDALONE CRYPTO
    // ========================================================================

    /// Generate an AES key or an RSA key pair.
    ///
    /// `key_size` falls back to the configured default for the algorithm.
    pub async fn generate_keys(
        &self,
        actor: &str,
        algorithm: Algorithm,
        key_size: Option<u32>,
    ) -> Result<GeneratedKeys> {
        let result = match algorithm {
            Algorithm::Aes => self.generate_aes(key_size),
            Algorithm::Rsa => self.generate_rsa(key_size).await,
        };

        let entry = AuditEntry::new(AuditEvent::KeyGenerate, "Key generation")
            .actor(actor)
            .with("algorithm", algorithm.as_str());
        let entry = match &result {
            Ok(keys) => entry.with("key_size", keys.key_size),
            Err(_) => entry,
        };
        audited(entry, result)
    }

    fn generate_aes(&self, key_size: Option<u32>) -> Result<GeneratedKeys> {
        let size = match key_size {
            Some(bits) => AesKeySize::try_from(bits)?,
            None => self.config.default_aes_key_size,
        };
        Ok(GeneratedKeys {
            algorithm: Algorithm::Aes,
            key_size: size.bits(),
            key: Some(SymmetricKey::generate(size)),
            public_key: None,
            private_key: None,
        })
    }

    async fn generate_rsa(&self, key_size: Option<u32>) -> Result<GeneratedKeys> {
        let size = match key_size {
            Some(bits) => RsaKeySize::try_from(bits)?,
            None => self.config.default_rsa_key_size,
        };
        let pair = self
            .pool
            .run_keygen(move || asymmetric::generate(size))
            .await?;
        Ok(GeneratedKeys {
            algorithm: Algorithm::Rsa,
            key_size: pair.key_size.bits(),
            key: None,
            public_key: Some(pair.public_key),
            private_key: Some(pair.private_key),
        })
    }

    /// AES-CBC encrypt with a supplied or fresh key
    pub async fn aes_encrypt(
        &self,
        actor: &str,
        plaintext: String,
        key_size: Option<AesKeySize>,
        key: Option<SymmetricKey>,
    ) -> Result<SymmetricCiphertext> {
        let size = key_size.unwrap_or(self.config.default_aes_key_size);
        let result = self
            .pool
            .run(move || symmetric::encrypt(&plaintext, key.as_ref(), size))
            .await;

        let entry = AuditEntry::new(AuditEvent::Encrypt, "AES encryption")
            .actor(actor)
            .with("algorithm", crypto::AES_ALGORITHM);
        audited(entry, result)
    }

    /// AES-CBC decrypt
    pub async fn aes_decrypt(
        &self,
        actor: &str,
        ciphertext: String,
        iv: String,
        key: SymmetricKey,
    ) -> Result<Decrypted> {
        let result = self
            .pool
            .run(move || symmetric::decrypt(&ciphertext, &iv, &key))
            .await;

        let entry = AuditEntry::new(AuditEvent::Decrypt, "AES decryption")
            .actor(actor)
            .with("algorithm", crypto::AES_ALGORITHM);
        audited(entry, result)
    }

    /// RSA-OAEP encrypt for the holder of `public_key`
    pub async fn rsa_encrypt(
        &self,
        actor: &str,
        plaintext: String,
        public_key: String,
    ) -> Result<AsymmetricCiphertext> {
        let result = self
            .pool
            .run(move || asymmetric::encrypt(&plaintext, &public_key))
            .await;

        let entry = AuditEntry::new(AuditEvent::Encrypt, "RSA encryption").actor(actor);
        let entry = match &result {
            Ok(sealed) => entry.with("algorithm", crypto::rsa_algorithm(sealed.key_size)),
            Err(_) => entry,
        };
        audited(entry, result)
    }

    /// RSA-OAEP decrypt
    pub async fn rsa_decrypt(
        &self,
        actor: &str,
        ciphertext: String,
        private_key: SecretPem,
    ) -> Result<Decrypted> {
        let result = self
            .pool
            .run(move || asymmetric::decrypt(&ciphertext, private_key.expose()))
            .await;

        let entry = AuditEntry::new(AuditEvent::Decrypt, "RSA decryption").actor(actor);
        audited(entry, result)
    }

    /// RSA-PSS sign
    pub async fn sign(
        &self,
        actor: &str,
        message: String,
        private_key: SecretPem,
    ) -> Result<SignatureOutput> {
        let result = self
            .pool
            .run(move || signing::sign(&message, private_key.expose()))
            .await;

        let entry = AuditEntry::new(AuditEvent::Sign, "Signature created")
            .actor(actor)
            .with("algorithm", signing::SIGNATURE_ALGORITHM);
        audited(entry, result)
    }

    /// RSA-PSS verify. A mismatch is `valid: false`, not an error.
    pub async fn verify(
        &self,
        actor: &str,
        message: String,
        signature: String,
        public_key: String,
    ) -> Result<Verification> {
        let result = self
            .pool
            .run(move || signing::verify(&message, &signature, &public_key))
            .await;

        let entry = AuditEntry::new(AuditEvent::Verify, "Signature checked")
            .actor(actor)
            .with("algorithm", signing::SIGNATURE_ALGORITHM);
        let entry = match &result {
            Ok(verification) => entry.with("valid", verification.valid),
            Err(_) => entry,
        };
        audited(entry, result)
    }

    // ========================================================================
    // USER KEYS
    // ========================================================================

    /// Give `user` a key pair if they have none. Existing keys are returned
    /// unchanged.
    ///
    /// On `TimedOut` the generation keeps running on its worker and still
    /// stores the pair when it finishes. Calling again later returns that
    /// pair with `created == false`.
    pub async fn ensure_user_keys(
        &self,
        user: &str,
        key_size: Option<RsaKeySize>,
    ) -> Result<(StoredPublicKey, bool)> {
        let size = key_size.unwrap_or(self.config.default_rsa_key_size);
        let service = self.service.clone();
        let owner = user.to_string();
        let result = self
            .pool
            .run_keygen(move || service.ensure_user_keys(&owner, size))
            .await;

        match result {
            Ok((stored, true)) => {
                audit::record(
                    AuditEvent::KeyGenerate,
                    Some(user),
                    format!("User key pair created ({} bits)", stored.key_size.bits()),
                );
                Ok((stored, true))
            }
            Ok(existing) => Ok(existing),
            Err(Error::TimedOut(detail)) => {
                let e = Error::TimedOut(format!(
                    "{}; the pair is still being created, retry to fetch it",
                    detail
                ));
                AuditEntry::new(AuditEvent::KeyGenerate, "User key pair creation timed out")
                    .actor(user)
                    .failed(&e)
                    .emit();
                Err(e)
            }
            Err(e) => {
                AuditEntry::new(AuditEvent::KeyGenerate, "User key pair creation failed")
                    .actor(user)
                    .failed(&e)
                    .emit();
                Err(e.sanitized())
            }
        }
    }

    /// Public key of `user`
    pub async fn public_key(&self, user: &str) -> Result<StoredPublicKey> {
        let service = self.service.clone();
        let user = user.to_string();
        self.pool.run(move || service.public_key(&user)).await
    }

    // ========================================================================
    // MESSAGING
    // ========================================================================

    /// Encrypt and store a message from `sender` to `recipient`
    pub async fn send_message(
        &self,
        sender: &str,
        recipient: &str,
        plaintext: String,
        encryption_type: EncryptionType,
        shared_key: Option<SymmetricKey>,
    ) -> Result<SendReceipt> {
        let service = self.service.clone();
        let (from, to) = (sender.to_string(), recipient.to_string());
        let result = self
            .pool
            .run(move || service.send(&from, &to, &plaintext, encryption_type, shared_key.as_ref()))
            .await;

        let entry = AuditEntry::new(AuditEvent::MessageSend, "Message sent")
            .actor(sender)
            .with("recipient", recipient)
            .with("encryption_type", encryption_type.as_str());
        let entry = match &result {
            Ok(receipt) => entry
                .with("message_id", receipt.id.as_str())
                .with("signed", receipt.signature_steps.is_some()),
            Err(_) => entry,
        };
        audited(entry, result)
    }

    /// Messages received by `user`
    pub async fn inbox(&self, user: &str) -> Result<Mailbox> {
        let service = self.service.clone();
        let user = user.to_string();
        self.pool.run(move || service.inbox(&user)).await
    }

    /// Messages sent by `user`
    pub async fn sent(&self, user: &str) -> Result<Mailbox> {
        let service = self.service.clone();
        let user = user.to_string();
        self.pool.run(move || service.sent(&user)).await
    }

    /// Messages sent or received by `user`
    pub async fn list_messages(&self, user: &str) -> Result<Mailbox> {
        let service = self.service.clone();
        let user = user.to_string();
        self.pool.run(move || service.list(&user)).await
    }

    /// One message with its decrypt hints, for its sender or recipient
    pub async fn get_message(&self, message_id: &str, requester: &str) -> Result<MessageDetail> {
        let service = self.service.clone();
        let (id, who) = (message_id.to_string(), requester.to_string());
        let result = self.pool.run(move || service.get(&id, &who)).await;

        let entry = AuditEntry::new(AuditEvent::MessageRead, "Message opened")
            .actor(requester)
            .with("message_id", message_id);
        let entry = match &result {
            Ok(detail) => entry.with("is_read", detail.message.is_read),
            Err(_) => entry,
        };
        audited(entry, result)
    }

    /// Decrypt a message on behalf of `requester`. `shared_key` is the base64
    /// AES key and is decoded only once the requester is known to be the
    /// recipient.
    pub async fn decrypt_message(
        &self,
        message_id: &str,
        requester: &str,
        shared_key: Option<String>,
    ) -> Result<DecryptedMessage> {
        let service = self.service.clone();
        let (id, who) = (message_id.to_string(), requester.to_string());
        let result = self
            .pool
            .run(move || service.decrypt(&id, &who, shared_key.as_deref()))
            .await;

        let entry = match &result {
            Err(Error::Forbidden) => {
                AuditEntry::new(AuditEvent::AccessDenied, "Decrypt attempted by non-recipient")
            }
            _ => AuditEntry::new(AuditEvent::MessageRead, "Message decrypted"),
        }
        .actor(requester)
        .with("message_id", message_id);
        let entry = match &result {
            Ok(opened) => entry
                .with("encryption_type", opened.encryption_type.as_str())
                .with("signature_valid", opened.signature_valid),
            Err(_) => entry,
        };
        audited(entry, result)
    }
}

/// Emit `entry` with the outcome of `result` and sanitize any error
fn audited<T>(entry: AuditEntry, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            entry.with("outcome", "success").emit();
            Ok(value)
        }
        Err(e) => {
            entry.failed(&e).emit();
            Err(e.sanitized())
        }
    }
}
