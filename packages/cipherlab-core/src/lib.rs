//! # Cipherlab Core
//!
//! A teaching cryptographic messaging engine. Every operation returns its
//! result together with a step-by-step trace of the intermediate values, so
//! a front end can show how AES-CBC, RSA-OAEP, hybrid encryption and RSA-PSS
//! signatures actually work.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CIPHERLAB CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                           API                                   │   │
//! │  │   JSON routes ──► CipherEngine (async, worker pool, audit)      │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │         ┌───────────────────────┴────────────────────┐                  │
//! │         ▼                                            ▼                  │
//! │  ┌─────────────┐                            ┌─────────────────┐         │
//! │  │  Messaging  │───────────────────────────►│     Storage     │         │
//! │  │             │                            │                 │         │
//! │  │ - Send      │                            │ - MessageStore  │         │
//! │  │ - Inbox     │                            │ - KeyStore      │         │
//! │  │ - Decrypt   │                            │ - SQLite / RAM  │         │
//! │  └──────┬──────┘                            └─────────────────┘         │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                          Crypto                                 │   │
//! │  │   AES-CBC │ RSA-OAEP │ RSA-PSS │ Hybrid │ StepTracer            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error taxonomy with stable codes and kinds
//! - [`crypto`] - Ciphers, signatures, keys and step traces
//! - [`storage`] - Message and key persistence (SQLite, in-memory)
//! - [`messaging`] - Send, list and decrypt messages between users
//! - [`pool`] - Bounded worker pool for CPU-bound crypto
//! - [`engine`] - Async facade over everything above
//! - [`api`] - JSON request routing
//! - [`audit`] - Structured audit events
//! - [`config`] - Engine configuration
//!
//! ## Security Notes
//!
//! This engine exists to teach. AES-CBC here carries no MAC, private keys
//! are kept in the store as plain PEM, and the key generation route hands
//! private keys to the caller. Do not use it to protect real secrets.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod api;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod pool;
pub mod storage;
/// Timestamp utilities.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use api::{dispatch, ApiResponse};
pub use config::EngineConfig;
pub use crypto::{AesKeySize, KeyPair, RsaKeySize, StepRecord, SymmetricKey};
pub use engine::CipherEngine;
pub use error::{Error, Result};
pub use messaging::EncryptionType;

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
