//! # Digital Signatures
//!
//! RSA-PSS over SHA-256.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SIGN / VERIFY                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  sign:    message ──► SHA-256 ──► PSS encode (random salt)             │
//! │                                   ──► s = EM^d mod n ──► Base64(s)      │
//! │                                                                         │
//! │  verify:  message ──► SHA-256 ─┐                                       │
//! │           signature ──► s^e mod n ──► PSS check ──► valid / invalid    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A signature that does not match is an answer, not an error: [`verify`]
//! returns `valid = false`. Only inputs that cannot be interpreted at all
//! (unparsable key, undecodable or wrongly sized signature) produce errors.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::keys;
use super::trace::{StepRecord, StepTracer};
use crate::error::{Error, Result};

/// Algorithm label reported for every signature
pub const SIGNATURE_ALGORITHM: &str = "RSA-PSS-SHA256";

/// Output of [`sign`]
#[derive(Debug, Clone, Serialize)]
pub struct SignatureOutput {
    /// Base64 signature
    pub signature: String,
    /// Hex SHA-256 digest of the message
    pub message_hash: String,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Output of [`verify`]
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    /// Whether the signature matches
    pub valid: bool,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Sign `message` with a PEM private key
pub fn sign(message: &str, private_key: &str) -> Result<SignatureOutput> {
    let key = keys::parse_private_key(private_key)?;
    let bits = key.size() * 8;

    let mut tracer = StepTracer::new();
    tracer.text("Message to sign", message);

    let digest = Sha256::digest(message.as_bytes());
    tracer.hex("SHA-256 digest", &digest);
    tracer.info(
        "PSS padding",
        format!("Probabilistic Signature Scheme, random salt, RSA-{} private key", bits),
    );

    let signing_key = BlindedSigningKey::<Sha256>::new(key);
    let signature = signing_key
        .try_sign_with_rng(&mut rand::rngs::OsRng, message.as_bytes())
        .map_err(|e| Error::SigningFailed(e.to_string()))?;
    let raw = signature.to_vec();
    tracer.hex_preview("Signature (EM^d mod n)", &raw);

    let encoded = BASE64.encode(&raw);
    tracer.base64("Base64 signature", &encoded, raw.len());

    Ok(SignatureOutput {
        signature: encoded,
        message_hash: hex::encode(digest),
        steps: tracer.finish(),
    })
}

/// Verify a base64 signature over `message` against a PEM public key
pub fn verify(message: &str, signature: &str, public_key: &str) -> Result<Verification> {
    let key = keys::parse_public_key(public_key)?;
    let raw = BASE64.decode(signature.trim())?;
    if raw.len() != key.size() {
        return Err(Error::InvalidInput(format!(
            "signature must be {} bytes for this key, got {}",
            key.size(),
            raw.len()
        )));
    }

    let mut tracer = StepTracer::new();
    tracer.text("Message", message);
    tracer.hex("SHA-256 digest", &Sha256::digest(message.as_bytes()));
    tracer.base64("Base64 signature", signature.trim(), raw.len());
    tracer.pem(
        format!("RSA-{} public key", key.size() * 8),
        &keys::display_pem(public_key)?,
    );

    let signature = Signature::try_from(raw.as_slice())
        .map_err(|_| Error::InvalidInput("malformed signature".into()))?;
    let valid = VerifyingKey::<Sha256>::new(key)
        .verify(message.as_bytes(), &signature)
        .is_ok();

    if valid {
        tracer.info("Verification", "✓ Signature valid");
    } else {
        tracer.info("Verification", "✗ Signature invalid");
    }

    Ok(Verification {
        valid,
        steps: tracer.finish(),
    })
}
