//! # Cryptography Module
//!
//! The three encryption schemes, the signature engine and the tracer they
//! all report through.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐               │
//! │  │  symmetric   │   │  asymmetric  │   │   signing    │               │
//! │  │  AES-CBC     │   │  RSA-OAEP    │   │  RSA-PSS     │               │
//! │  │  128/192/256 │   │  2048-4096   │   │  SHA-256     │               │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────┘               │
//! │         │                  │                                            │
//! │         └───────┬──────────┘                                            │
//! │                 ▼                                                       │
//! │         ┌──────────────┐                                                │
//! │         │    hybrid    │  AES payload + RSA-wrapped session key        │
//! │         └──────────────┘                                                │
//! │                                                                         │
//! │  Every operation builds its own StepTracer and returns the finished    │
//! │  trace next to its result.                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Parameters |
//! |-----------|---------|------------|
//! | AES-CBC | Symmetric encryption | PKCS#7 padding, random 16-byte IV |
//! | RSA-OAEP | Asymmetric encryption | SHA-256, MGF1-SHA-256, e = 65537 |
//! | RSA-PSS | Signatures | SHA-256, random salt |
//! | Hybrid | Large payloads | AES-256 session key wrapped with RSA-OAEP |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: AES keys and private PEM text are zeroized on drop
//! 2. **Secure Random**: `rand::rngs::OsRng` for keys, IVs, OAEP seeds and salts
//! 3. **No IV Reuse**: a fresh IV for every AES encryption
//! 4. **No Oracles**: decryption failures are reported without detail

pub mod asymmetric;
pub mod hybrid;
pub mod keys;
mod oaep;
pub mod signing;
pub mod symmetric;
mod trace;

use serde::Serialize;

pub use asymmetric::AsymmetricCiphertext;
pub use hybrid::{HybridCiphertext, HYBRID_ALGORITHM};
pub use keys::{
    parse_private_key, parse_public_key, Algorithm, AesKeySize, KeyPair, RsaKeySize, SecretPem,
    SymmetricKey,
};
pub use signing::{SignatureOutput, Verification, SIGNATURE_ALGORITHM};
pub use symmetric::SymmetricCiphertext;
pub use trace::{StepRecord, StepTracer, StepType};

/// Algorithm label for AES-CBC results
pub const AES_ALGORITHM: &str = "AES-CBC";

/// Algorithm label for RSA-OAEP results with a key of `size`
pub fn rsa_algorithm(size: RsaKeySize) -> String {
    format!("RSA-{}-OAEP", size.bits())
}

/// Plaintext recovered by any scheme, with its trace
#[derive(Debug, Clone, Serialize)]
pub struct Decrypted {
    /// Recovered UTF-8 text
    pub plaintext: String,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Shared RSA fixtures. Key generation dominates test time, so every test
/// module borrows the same pairs.
#[cfg(test)]
pub(crate) mod test_keys {
    use once_cell::sync::Lazy;

    use super::{asymmetric, KeyPair, RsaKeySize};

    pub static ALICE: Lazy<KeyPair> =
        Lazy::new(|| asymmetric::generate(RsaKeySize::Rsa2048).unwrap());

    pub static BOB: Lazy<KeyPair> =
        Lazy::new(|| asymmetric::generate(RsaKeySize::Rsa2048).unwrap());
}
