//! # Messaging Module
//!
//! Encrypted message exchange between users, over any of the three schemes.
//!
//! ## Send Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SEND                                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice) ──► "Hello Bob!" + encryption_type                     │
//! │                                                                         │
//! │  AES     key = supplied or fresh AES-256                               │
//! │          AES-CBC(key, plaintext) ──► ciphertext, iv                    │
//! │          key is echoed to Alice once; the engine never stores it       │
//! │                                                                         │
//! │  RSA     RSA-OAEP(bob.public_key, plaintext) ──► ciphertext            │
//! │          RSA-PSS(alice.private_key, plaintext) ──► signature           │
//! │                                                                         │
//! │  HYBRID  AES-CBC(session key) + RSA-OAEP(bob.public_key, session key)  │
//! │          ──► ciphertext, iv, wrapped_key                               │
//! │          RSA-PSS(alice.private_key, plaintext) ──► signature           │
//! │                                                                         │
//! │  Output: immutable EncryptedMessage in the MessageStore                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decrypt Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DECRYPT                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Look up the message                      → MessageNotFound         │
//! │  2. requester == recipient?                  → Forbidden               │
//! │  3. Reverse the scheme named by the message                            │
//! │       AES     needs the shared key           → MissingKey / InvalidKey │
//! │       RSA     needs bob.private_key          → NoKeyPair               │
//! │       HYBRID  needs bob.private_key          → NoKeyPair               │
//! │  4. Verify the sender's signature, if any                              │
//! │  5. Mark read (separate from the message record)                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shared key arrives as base64 text and is decoded only after step 2,
//! so a non-recipient learns nothing about the key they supplied.
//!
//! Sending signs only when the sender already owns a key pair. Signing is
//! never a reason to create one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    self, asymmetric, hybrid, signing, symmetric, AesKeySize, KeyPair, RsaKeySize, StepRecord,
    SymmetricKey,
};
use crate::error::{Error, Result};
use crate::storage::{KeyStore, MessageStore, StoredMessage, StoredPublicKey};

/// Characters of ciphertext shown in a message preview by default
pub const DEFAULT_PREVIEW_LEN: usize = 32;

// ============================================================================
// TYPES
// ============================================================================

/// Scheme a message was encrypted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncryptionType {
    /// AES-CBC with a shared key held by the users
    Aes,
    /// RSA-OAEP directly on the plaintext
    Rsa,
    /// AES-CBC payload with an RSA-OAEP wrapped session key
    Hybrid,
}

impl EncryptionType {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes => "AES",
            Self::Rsa => "RSA",
            Self::Hybrid => "HYBRID",
        }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AES" => Ok(Self::Aes),
            "RSA" => Ok(Self::Rsa),
            "HYBRID" => Ok(Self::Hybrid),
            other => Err(Error::InvalidInput(format!("unknown encryption type: {}", other))),
        }
    }
}

/// A stored message. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Unique message ID (UUID)
    pub id: String,
    /// Sending user
    pub sender: String,
    /// Receiving user, the only one allowed to decrypt
    pub recipient: String,
    /// Scheme used
    pub encryption_type: EncryptionType,
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 IV (AES and HYBRID)
    pub iv: Option<String>,
    /// Base64 wrapped session key (HYBRID)
    pub wrapped_key: Option<String>,
    /// Base64 sender signature over the plaintext (RSA and HYBRID)
    pub signature: Option<String>,
    /// AES key bits for AES messages, recipient RSA bits otherwise
    pub key_size: u32,
    /// Creation time, Unix milliseconds
    pub created_at: i64,
}

impl EncryptedMessage {
    /// Leading characters of the ciphertext, computed on demand
    pub fn preview(&self, len: usize) -> String {
        if self.ciphertext.chars().count() <= len {
            return self.ciphertext.clone();
        }
        let head: String = self.ciphertext.chars().take(len).collect();
        format!("{}...", head)
    }
}

/// What a mailbox listing shows for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Message ID
    pub id: String,
    /// Sending user
    pub sender: String,
    /// Receiving user
    pub recipient: String,
    /// Scheme used
    pub encryption_type: EncryptionType,
    /// Truncated base64 ciphertext
    pub preview: String,
    /// Whether the recipient has decrypted it
    pub is_read: bool,
    /// Creation time, Unix milliseconds
    pub created_at: i64,
}

/// A listing of messages, newest first
#[derive(Debug, Clone, Serialize)]
pub struct Mailbox {
    /// The messages
    pub messages: Vec<MessageSummary>,
    /// Unread messages in this listing
    pub unread_count: usize,
}

/// A full stored message plus its read state
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    /// The stored message
    #[serde(flatten)]
    pub message: EncryptedMessage,
    /// Whether the recipient has opened it
    pub is_read: bool,
}

/// How a message can be decrypted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptInfo {
    /// Scheme of the message
    #[serde(rename = "type")]
    pub kind: EncryptionType,
    /// Request field the caller must supply, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<&'static str>,
    /// Human readable hint
    pub note: &'static str,
}

/// Result of [`MessageService::get`]
#[derive(Debug, Clone, Serialize)]
pub struct MessageDetail {
    /// The message
    pub message: MessageView,
    /// `true` when the caller can decrypt without further input
    pub can_decrypt: bool,
    /// Absent for the sender of an RSA or HYBRID message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decrypt_info: Option<DecryptInfo>,
}

/// Result of a send
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    /// New message ID
    pub id: String,
    /// Scheme used
    pub encryption_type: EncryptionType,
    /// Algorithm label
    pub algorithm: String,
    /// Trace of the encryption
    pub encryption_steps: Vec<StepRecord>,
    /// Trace of the signature, when the sender signed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_steps: Option<Vec<StepRecord>>,
    /// The AES key to hand to the recipient out of band (AES only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_key: Option<SymmetricKey>,
}

/// Result of a decrypt
#[derive(Debug, Clone, Serialize)]
pub struct DecryptedMessage {
    /// Message ID
    pub id: String,
    /// Recovered text
    pub plaintext: String,
    /// Scheme used
    pub encryption_type: EncryptionType,
    /// `None` when the message carried no signature
    pub signature_valid: Option<bool>,
    /// Trace of the decryption
    pub decryption_steps: Vec<StepRecord>,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Sends, lists and decrypts messages over pluggable storage
pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    keys: Arc<dyn KeyStore>,
    preview_len: usize,
}

impl MessageService {
    /// Create a service over the given stores
    pub fn new(messages: Arc<dyn MessageStore>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            messages,
            keys,
            preview_len: DEFAULT_PREVIEW_LEN,
        }
    }

    /// Set how many ciphertext characters previews show
    pub fn with_preview_len(mut self, preview_len: usize) -> Self {
        self.preview_len = preview_len;
        self
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    /// Return the user's public key, generating a pair first if they have none.
    ///
    /// Existing keys are never replaced, whatever `key_size` asks for. The
    /// boolean is `true` when this call created the pair.
    pub fn ensure_user_keys(&self, user: &str, key_size: RsaKeySize) -> Result<(StoredPublicKey, bool)> {
        if let Some(existing) = self.keys.public_key(user)? {
            return Ok((existing, false));
        }

        let pair = asymmetric::generate(key_size)?;
        let created = self.keys.put_key_pair(user, &pair)?;
        if created {
            tracing::info!(user, bits = key_size.bits(), "Created key pair");
        }

        // Re-read so a concurrent creator's pair wins consistently.
        let stored = self.keys.public_key(user)?.ok_or_else(|| {
            Error::Internal(format!("key pair for {} vanished after insert", user))
        })?;
        Ok((stored, created))
    }

    /// Store an externally generated key pair for a user, unless they have one
    pub fn install_user_keys(&self, user: &str, pair: &KeyPair) -> Result<bool> {
        self.keys.put_key_pair(user, pair)
    }

    /// The user's public key
    pub fn public_key(&self, user: &str) -> Result<StoredPublicKey> {
        self.keys
            .public_key(user)?
            .ok_or_else(|| Error::NoKeyPair(user.to_string()))
    }

    // ------------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------------

    /// Encrypt `plaintext` for `recipient` and store it
    pub fn send(
        &self,
        sender: &str,
        recipient: &str,
        plaintext: &str,
        encryption_type: EncryptionType,
        shared_key: Option<&SymmetricKey>,
    ) -> Result<SendReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = crate::time::now_timestamp_millis();

        let (message, algorithm, encryption_steps, signature_steps, shared_key) =
            match encryption_type {
                EncryptionType::Aes => {
                    let sealed = symmetric::encrypt(plaintext, shared_key, AesKeySize::Aes256)?;
                    let message = EncryptedMessage {
                        id: id.clone(),
                        sender: sender.to_string(),
                        recipient: recipient.to_string(),
                        encryption_type,
                        ciphertext: sealed.ciphertext,
                        iv: Some(sealed.iv),
                        wrapped_key: None,
                        signature: None,
                        key_size: sealed.key_size.bits(),
                        created_at,
                    };
                    (message, crypto::AES_ALGORITHM.to_string(), sealed.steps, None, Some(sealed.key))
                }
                EncryptionType::Rsa => {
                    let recipient_key = self.public_key(recipient)?;
                    let sealed = asymmetric::encrypt(plaintext, &recipient_key.public_key)?;
                    let signed = self.sign_as(sender, plaintext)?;
                    let message = EncryptedMessage {
                        id: id.clone(),
                        sender: sender.to_string(),
                        recipient: recipient.to_string(),
                        encryption_type,
                        ciphertext: sealed.ciphertext,
                        iv: None,
                        wrapped_key: None,
                        signature: signed.as_ref().map(|s| s.signature.clone()),
                        key_size: sealed.key_size.bits(),
                        created_at,
                    };
                    (
                        message,
                        crypto::rsa_algorithm(sealed.key_size),
                        sealed.steps,
                        signed.map(|s| s.steps),
                        None,
                    )
                }
                EncryptionType::Hybrid => {
                    let recipient_key = self.public_key(recipient)?;
                    let sealed = hybrid::encrypt(plaintext, &recipient_key.public_key)?;
                    let signed = self.sign_as(sender, plaintext)?;
                    let message = EncryptedMessage {
                        id: id.clone(),
                        sender: sender.to_string(),
                        recipient: recipient.to_string(),
                        encryption_type,
                        ciphertext: sealed.ciphertext,
                        iv: Some(sealed.iv),
                        wrapped_key: Some(sealed.wrapped_key),
                        signature: signed.as_ref().map(|s| s.signature.clone()),
                        key_size: sealed.key_size.bits(),
                        created_at,
                    };
                    (
                        message,
                        crypto::HYBRID_ALGORITHM.to_string(),
                        sealed.steps,
                        signed.map(|s| s.steps),
                        None,
                    )
                }
            };

        self.messages.put_message(&message)?;
        tracing::info!(
            id = %message.id,
            sender,
            recipient,
            encryption_type = %encryption_type,
            "Stored message"
        );

        Ok(SendReceipt {
            id,
            encryption_type,
            algorithm,
            encryption_steps,
            signature_steps,
            shared_key,
        })
    }

    fn sign_as(&self, sender: &str, plaintext: &str) -> Result<Option<signing::SignatureOutput>> {
        match self.keys.private_key(sender)? {
            Some(private_key) => signing::sign(plaintext, private_key.expose()).map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------------

    /// Messages received by `user`, newest first
    pub fn inbox(&self, user: &str) -> Result<Mailbox> {
        let stored = self.messages.messages_for_recipient(user)?;
        Ok(self.mailbox(stored))
    }

    /// Messages sent by `user`, newest first. `unread_count` counts those the
    /// recipient has not opened yet.
    pub fn sent(&self, user: &str) -> Result<Mailbox> {
        let stored = self.messages.messages_from_sender(user)?;
        Ok(self.mailbox(stored))
    }

    /// Messages sent or received by `user`, newest first. `unread_count`
    /// counts only received messages.
    pub fn list(&self, user: &str) -> Result<Mailbox> {
        let mut stored = self.messages.messages_for_recipient(user)?;
        let unread_count = stored.iter().filter(|s| !s.is_read).count();

        let sent = self.messages.messages_from_sender(user)?;
        // Notes to self are already in the received half.
        stored.extend(sent.into_iter().filter(|s| s.message.recipient != user));
        stored.sort_by(|a, b| b.message.created_at.cmp(&a.message.created_at));

        let mut mailbox = self.mailbox(stored);
        mailbox.unread_count = unread_count;
        Ok(mailbox)
    }

    /// One message, visible to its sender and recipient only.
    ///
    /// Anyone else gets `MessageNotFound`, the same as for an unknown id.
    /// Opening by the recipient marks the message read.
    pub fn get(&self, message_id: &str, requester: &str) -> Result<MessageDetail> {
        let stored = self
            .messages
            .get_message(message_id)?
            .ok_or(Error::MessageNotFound)?;
        let message = stored.message;

        let is_recipient = message.recipient == requester;
        if !is_recipient && message.sender != requester {
            tracing::warn!(id = message_id, requester, "Message lookup by non-participant");
            return Err(Error::MessageNotFound);
        }

        let mut is_read = stored.is_read;
        if is_recipient && !is_read {
            self.messages.mark_read(&message.id)?;
            is_read = true;
        }

        let (can_decrypt, decrypt_info) = match message.encryption_type {
            EncryptionType::Aes => (
                false,
                Some(DecryptInfo {
                    kind: EncryptionType::Aes,
                    requires: Some("shared_key"),
                    note: "The shared AES key is needed to decrypt",
                }),
            ),
            EncryptionType::Rsa if is_recipient => (
                true,
                Some(DecryptInfo {
                    kind: EncryptionType::Rsa,
                    requires: None,
                    note: "Decrypts with your private key",
                }),
            ),
            EncryptionType::Hybrid if is_recipient => (
                true,
                Some(DecryptInfo {
                    kind: EncryptionType::Hybrid,
                    requires: None,
                    note: "The AES session key is unwrapped with your private key first",
                }),
            ),
            _ => (false, None),
        };

        Ok(MessageDetail {
            message: MessageView { message, is_read },
            can_decrypt,
            decrypt_info,
        })
    }

    fn mailbox(&self, stored: Vec<StoredMessage>) -> Mailbox {
        let unread_count = stored.iter().filter(|s| !s.is_read).count();
        let messages = stored
            .into_iter()
            .map(|s| MessageSummary {
                preview: s.message.preview(self.preview_len),
                id: s.message.id,
                sender: s.message.sender,
                recipient: s.message.recipient,
                encryption_type: s.message.encryption_type,
                is_read: s.is_read,
                created_at: s.message.created_at,
            })
            .collect();
        Mailbox {
            messages,
            unread_count,
        }
    }

    // ------------------------------------------------------------------------
    // Decrypt
    // ------------------------------------------------------------------------

    /// Decrypt a stored message on behalf of `requester`.
    ///
    /// `shared_key` is the base64 AES key, only looked at for AES messages.
    pub fn decrypt(
        &self,
        message_id: &str,
        requester: &str,
        shared_key: Option<&str>,
    ) -> Result<DecryptedMessage> {
        let message = self
            .messages
            .get_message(message_id)?
            .ok_or(Error::MessageNotFound)?
            .message;

        if message.recipient != requester {
            tracing::warn!(id = message_id, requester, "Decrypt refused for non-recipient");
            return Err(Error::Forbidden);
        }

        let opened = self.open(&message, shared_key).map_err(Error::sanitized)?;

        let signature_valid = match &message.signature {
            Some(signature) => Some(self.check_signature(&message.sender, &opened.plaintext, signature)),
            None => None,
        };

        self.messages.mark_read(&message.id)?;

        Ok(DecryptedMessage {
            id: message.id,
            plaintext: opened.plaintext,
            encryption_type: message.encryption_type,
            signature_valid,
            decryption_steps: opened.steps,
        })
    }

    fn open(&self, message: &EncryptedMessage, shared_key: Option<&str>) -> Result<crypto::Decrypted> {
        match message.encryption_type {
            EncryptionType::Aes => {
                let encoded = shared_key
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or(Error::MissingKey)?;
                let key = SymmetricKey::from_base64(encoded)?;
                symmetric::decrypt(&message.ciphertext, required(&message.iv, "iv")?, &key)
            }
            EncryptionType::Rsa => {
                let private_key = self.private_key(&message.recipient)?;
                asymmetric::decrypt(&message.ciphertext, private_key.expose())
            }
            EncryptionType::Hybrid => {
                let private_key = self.private_key(&message.recipient)?;
                hybrid::decrypt(
                    &message.ciphertext,
                    required(&message.iv, "iv")?,
                    required(&message.wrapped_key, "wrapped_key")?,
                    private_key.expose(),
                )
            }
        }
    }

    fn private_key(&self, user: &str) -> Result<crypto::SecretPem> {
        self.keys
            .private_key(user)?
            .ok_or_else(|| Error::NoKeyPair(user.to_string()))
    }

    /// A signature that cannot be checked counts as invalid
    fn check_signature(&self, sender: &str, plaintext: &str, signature: &str) -> bool {
        match self.keys.public_key(sender) {
            Ok(Some(key)) => signing::verify(plaintext, signature, &key.public_key)
                .map(|v| v.valid)
                .unwrap_or(false),
            _ => false,
        }
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| Error::Internal(format!("stored message has no {}", name)))
}

// ============================================================================
// TESTS
// ============================================================================
