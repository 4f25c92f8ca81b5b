//! # Hybrid Scheme
//!
//! RSA-OAEP key wrapping combined with AES-CBC bulk encryption.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HYBRID ENCRYPTION                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  session key ◄── 32 random bytes (fresh per message)                   │
//! │       │                                                                 │
//! │       ├──► AES-CBC(session key, random IV, plaintext) ──► ciphertext   │
//! │       │                                                                 │
//! │       └──► RSA-OAEP(recipient public key, session key) ──► wrapped_key │
//! │                                                                         │
//! │  Stored: ciphertext + iv + wrapped_key                                 │
//! │                                                                         │
//! │  Decrypt: RSA-OAEP⁻¹(private key, wrapped_key) ──► session key         │
//! │           AES-CBC⁻¹(session key, iv, ciphertext) ──► plaintext         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payload size is bounded only by AES, not by the RSA modulus. Each
//! message has its own session key, but every session key is wrapped under
//! the same long-lived RSA key, so there is no forward secrecy.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use super::asymmetric;
use super::keys::{self, AesKeySize, RsaKeySize, SymmetricKey};
use super::symmetric;
use super::trace::{StepRecord, StepTracer};
use super::Decrypted;
use crate::error::{Error, Result};

/// Algorithm label for the composed scheme
pub const HYBRID_ALGORITHM: &str = "HYBRID-RSA-OAEP+AES-CBC";

/// Size of every session key
pub const SESSION_KEY_SIZE: AesKeySize = AesKeySize::Aes256;

/// Output of [`encrypt`]
#[derive(Debug, Clone, Serialize)]
pub struct HybridCiphertext {
    /// Base64 AES-CBC ciphertext
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// Base64 RSA-OAEP wrapped session key
    pub wrapped_key: String,
    /// Size of the recipient key
    pub key_size: RsaKeySize,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Encrypt `plaintext` of any length for the holder of `public_key`
pub fn encrypt(plaintext: &str, public_key: &str) -> Result<HybridCiphertext> {
    let rsa_key = keys::parse_public_key(public_key)?;
    let key_size = keys::rsa_key_size(&rsa_key)?;

    let session_key = SymmetricKey::generate(SESSION_KEY_SIZE);

    let mut tracer = StepTracer::new();
    tracer.secret("Session key generated", session_key.as_bytes());

    let sealed = symmetric::encrypt(plaintext, Some(&session_key), SESSION_KEY_SIZE)?;
    tracer.absorb(sealed.steps);

    let mut wrap = StepTracer::new();
    wrap.pem(
        format!("RSA-{} public key", key_size.bits()),
        &keys::display_pem(public_key)?,
    );
    let wrapped = asymmetric::encrypt_block(session_key.as_bytes(), &rsa_key, true, &mut wrap)?;
    tracer.absorb(wrap.finish());

    let wrapped_key = BASE64.encode(&wrapped);
    tracer.base64("Session key wrapped", &wrapped_key, wrapped.len());

    Ok(HybridCiphertext {
        ciphertext: sealed.ciphertext,
        iv: sealed.iv,
        wrapped_key,
        key_size,
        steps: tracer.finish(),
    })
}

/// Unwrap the session key with `private_key`, then decrypt the payload
pub fn decrypt(
    ciphertext: &str,
    iv: &str,
    wrapped_key: &str,
    private_key: &str,
) -> Result<Decrypted> {
    let rsa_key = keys::parse_private_key(private_key)?;
    let wrapped = BASE64.decode(wrapped_key.trim())?;

    let mut tracer = StepTracer::new();
    tracer.base64("Wrapped session key", wrapped_key.trim(), wrapped.len());

    let raw_key = asymmetric::decrypt_block(&wrapped, &rsa_key, &mut tracer)?;
    // Anything other than a valid AES key length means the unwrap was wrong.
    let session_key = SymmetricKey::from_bytes(&raw_key).map_err(|_| Error::DecryptionFailed)?;
    tracer.secret("Session key unwrapped", session_key.as_bytes());

    let opened = symmetric::decrypt(ciphertext, iv, &session_key)?;
    tracer.absorb(opened.steps);

    Ok(Decrypted {
        plaintext: opened.plaintext,
        steps: tracer.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys::{ALICE, BOB};
    use crate::crypto::StepType;

    #[test]
    fn test_roundtrip_far_beyond_rsa_capacity() {
        let plaintext = "x".repeat(10_000);
        let enc = encrypt(&plaintext, &ALICE.public_key).unwrap();
        let dec = decrypt(&enc.ciphertext, &enc.iv, &enc.wrapped_key, ALICE.private_key.expose())
            .unwrap();
        assert_eq!(dec.plaintext, plaintext);
    }

    #[test]
    fn test_fresh_session_key_per_message() {
        let a = encrypt("same", &ALICE.public_key).unwrap();
        let b = encrypt("same", &ALICE.public_key).unwrap();
        assert_ne!(a.wrapped_key, b.wrapped_key);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_private_key_fails_generically() {
        let enc = encrypt("for alice only", &ALICE.public_key).unwrap();
        let err = decrypt(&enc.ciphertext, &enc.iv, &enc.wrapped_key, BOB.private_key.expose())
            .unwrap_err()
            .sanitized();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[test]
    fn test_trace_is_framed_by_session_key_steps() {
        let enc = encrypt("framed", &ALICE.public_key).unwrap();
        let first = enc.steps.first().unwrap();
        let last = enc.steps.last().unwrap();

        assert_eq!(first.name, "Session key generated");
        assert_eq!(first.kind, StepType::HexPartial);
        assert_eq!(last.name, "Session key wrapped");
        assert_eq!(last.data, enc.wrapped_key);

        let numbers: Vec<u32> = enc.steps.iter().map(|s| s.step).collect();
        let expected: Vec<u32> = (1..=enc.steps.len() as u32).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn test_trace_never_shows_session_key_in_full() {
        let enc = encrypt("secret", &ALICE.public_key).unwrap();
        let dec = decrypt(&enc.ciphertext, &enc.iv, &enc.wrapped_key, ALICE.private_key.expose())
            .unwrap();

        let private = keys::parse_private_key(ALICE.private_key.expose()).unwrap();
        let wrapped = BASE64.decode(&enc.wrapped_key).unwrap();
        let session_key =
            asymmetric::decrypt_block(&wrapped, &private, &mut StepTracer::new()).unwrap();
        let full_hex = hex::encode(session_key.as_slice());
        let full_b64 = BASE64.encode(session_key.as_slice());

        for step in enc.steps.iter().chain(dec.steps.iter()) {
            assert!(!step.data.contains(&full_hex), "{}", step.name);
            assert!(!step.data.contains(&full_b64), "{}", step.name);
        }
    }
}
