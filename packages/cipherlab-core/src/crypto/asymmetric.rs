//! # Asymmetric Cipher
//!
//! RSA-OAEP (SHA-256, MGF1-SHA-256) over 2048, 3072 and 4096-bit keys.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       RSA-OAEP ENCRYPTION                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Recipient public key (SPKI PEM)                               │
//! │  Step 2: Plaintext                                                     │
//! │          must satisfy len ≤ k − 2·32 − 2                               │
//! │          (190 bytes for RSA-2048)                                      │
//! │  Step 3: OAEP padded block, k bytes, randomized                        │
//! │  Step 4: c = EM^e mod n                                                │
//! │  Step 5: Base64(c)                                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every decryption failure, whether a wrong key or a corrupted ciphertext,
//! surfaces as the same [`Error::DecryptionFailed`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{self, KeyPair, RsaKeySize, SecretPem, RSA_PUBLIC_EXPONENT};
use super::oaep;
use super::trace::{StepRecord, StepTracer};
use super::Decrypted;
use crate::error::{Error, Result};

/// Output of [`encrypt`]
#[derive(Debug, Clone, Serialize)]
pub struct AsymmetricCiphertext {
    /// Base64 ciphertext, exactly one modulus long
    pub ciphertext: String,
    /// Size of the recipient key
    pub key_size: RsaKeySize,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Largest plaintext, in bytes, that a key of `size` can encrypt
pub fn max_plaintext_len(size: RsaKeySize) -> usize {
    oaep::max_message_len(size.bytes())
}

/// Generate a fresh RSA key pair with e = 65537
pub fn generate(size: RsaKeySize) -> Result<KeyPair> {
    let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut rand::rngs::OsRng, size.bits() as usize, &exponent)
        .map_err(|e| Error::KeyGenerationFailed(e.to_string()))?;

    let key_pair = key_pair_from(&private, size)?;
    tracing::debug!(bits = size.bits(), "Generated RSA key pair");
    Ok(key_pair)
}

fn key_pair_from(private: &RsaPrivateKey, size: RsaKeySize) -> Result<KeyPair> {
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::KeyGenerationFailed(format!("private key encoding: {}", e)))?;
    let public_key = RsaPublicKey::from(private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::KeyGenerationFailed(format!("public key encoding: {}", e)))?;

    Ok(KeyPair {
        public_key,
        private_key: SecretPem::from(private_pem),
        key_size: size,
    })
}

/// Encrypt `plaintext` for the holder of `public_key`
pub fn encrypt(plaintext: &str, public_key: &str) -> Result<AsymmetricCiphertext> {
    let key = keys::parse_public_key(public_key)?;
    let key_size = keys::rsa_key_size(&key)?;

    let mut tracer = StepTracer::new();
    tracer.pem(
        format!("RSA-{} public key", key_size.bits()),
        &keys::display_pem(public_key)?,
    );
    tracer.text("Original message", plaintext);

    let raw = encrypt_block(plaintext.as_bytes(), &key, false, &mut tracer)?;

    let ciphertext = BASE64.encode(&raw);
    tracer.base64("Base64 ciphertext", &ciphertext, raw.len());

    Ok(AsymmetricCiphertext {
        ciphertext,
        key_size,
        steps: tracer.finish(),
    })
}

/// Decrypt a base64 RSA-OAEP ciphertext with `private_key`
pub fn decrypt(ciphertext: &str, private_key: &str) -> Result<Decrypted> {
    let key = keys::parse_private_key(private_key)?;
    let raw = BASE64.decode(ciphertext.trim())?;

    let mut tracer = StepTracer::new();
    tracer.base64("Base64 ciphertext", ciphertext.trim(), raw.len());
    tracer.hex_preview("Decoded ciphertext", &raw);

    let recovered = decrypt_block(&raw, &key, &mut tracer)?;
    let plaintext =
        String::from_utf8(recovered.to_vec()).map_err(|_| Error::DecryptionFailed)?;
    tracer.text("Recovered message", &plaintext);

    Ok(Decrypted {
        plaintext,
        steps: tracer.finish(),
    })
}

// ============================================================================
// BLOCK OPERATIONS
// ============================================================================

/// OAEP-encode and exponentiate one block.
///
/// With `secret` set the payload is recorded only as a partial hex dump,
/// which is how a wrapped session key appears in a hybrid trace.
pub(crate) fn encrypt_block(
    payload: &[u8],
    key: &RsaPublicKey,
    secret: bool,
    tracer: &mut StepTracer,
) -> Result<Vec<u8>> {
    let k = key.size();
    let em = oaep::encode(payload, k)?;

    tracer.info(
        "OAEP padding",
        format!(
            "SHA-256 / MGF1-SHA-256, {} of {} payload bytes used",
            payload.len(),
            oaep::max_message_len(k)
        ),
    );
    if secret {
        tracer.secret("OAEP padded block", &em);
    } else {
        tracer.hex_preview("OAEP padded block", &em);
    }

    let c = BigUint::from_bytes_be(&em).modpow(key.e(), key.n());
    let c = c.to_bytes_be();

    // I2OSP: left-pad to the modulus length.
    let mut raw = vec![0u8; k - c.len()];
    raw.extend_from_slice(&c);
    tracer.hex_preview("RSA ciphertext (EM^e mod n)", &raw);

    Ok(raw)
}

/// Decrypt and OAEP-decode one block
pub(crate) fn decrypt_block(
    raw: &[u8],
    key: &RsaPrivateKey,
    tracer: &mut StepTracer,
) -> Result<Zeroizing<Vec<u8>>> {
    tracer.info(
        "RSA private key",
        format!("RSA-{} private key loaded", key.size() * 8),
    );

    let recovered = key
        .decrypt(Oaep::new::<Sha256>(), raw)
        .map(Zeroizing::new)
        .map_err(|_| Error::DecryptionFailed)?;
    tracer.info("OAEP padding", "Padding verified and removed");

    Ok(recovered)
}

// ============================================================================
// TESTS
// ============================================================================
