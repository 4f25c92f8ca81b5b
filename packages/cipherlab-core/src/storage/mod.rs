//! # Storage Module
//!
//! Persistence for encrypted messages and user key pairs.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  MessageService ──► MessageStore (put / get / list-by-user / read)     │
//! │                 ──► KeyStore     (key pair per user, write-once)       │
//! │                                                                         │
//! │  ┌──────────────────────────┐    ┌──────────────────────────┐          │
//! │  │  MemoryStore             │    │  Database (SQLite)        │          │
//! │  │  RwLock<HashMap/Vec>     │    │  Arc<Mutex<Connection>>   │          │
//! │  │  tests, demos            │    │  file or in-memory        │          │
//! │  └──────────────────────────┘    └──────────────────────────┘          │
//! │                                                                         │
//! │  Tables: user_keys · messages · message_reads · schema_version         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stored messages are immutable. Read state lives beside them, never in
//! them, so marking a message read cannot alter its ciphertext or metadata.
//! Both listing operations return newest first.

mod database;
mod memory;
mod schema;

pub use database::Database;
pub use memory::MemoryStore;

use serde::Serialize;

use crate::crypto::{KeyPair, RsaKeySize, SecretPem};
use crate::error::Result;
use crate::messaging::EncryptedMessage;

/// A message together with its read flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// The immutable message
    pub message: EncryptedMessage,
    /// Whether the recipient has decrypted it
    pub is_read: bool,
}

/// A user's public key as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPublicKey {
    /// SPKI PEM
    pub public_key: String,
    /// Modulus size
    pub key_size: RsaKeySize,
}

/// Narrow persistence interface for encrypted messages
pub trait MessageStore: Send + Sync {
    /// Persist a new message. Ids are unique; a duplicate id is an error.
    fn put_message(&self, message: &EncryptedMessage) -> Result<()>;

    /// Fetch one message by id
    fn get_message(&self, id: &str) -> Result<Option<StoredMessage>>;

    /// Messages received by `user`, newest first
    fn messages_for_recipient(&self, user: &str) -> Result<Vec<StoredMessage>>;

    /// Messages sent by `user`, newest first
    fn messages_from_sender(&self, user: &str) -> Result<Vec<StoredMessage>>;

    /// Flag a message as read. Returns `false` if it already was.
    fn mark_read(&self, id: &str) -> Result<bool>;
}

/// Write-once storage for user key pairs
pub trait KeyStore: Send + Sync {
    /// Store a key pair for `user` unless one exists.
    ///
    /// Returns `true` if the pair was inserted, `false` if the user already
    /// had keys (which are left untouched).
    fn put_key_pair(&self, user: &str, pair: &KeyPair) -> Result<bool>;

    /// The user's public key, if any
    fn public_key(&self, user: &str) -> Result<Option<StoredPublicKey>>;

    /// The user's private key, if any
    fn private_key(&self, user: &str) -> Result<Option<SecretPem>>;
}
