//! # Symmetric Cipher
//!
//! AES-CBC with PKCS#7 padding and a fresh random IV per call.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AES-CBC ENCRYPTION                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Plaintext (UTF-8 text)                                        │
//! │  Step 2: Key (supplied, or 128/192/256 random bits)                    │
//! │  Step 3: IV (16 random bytes, never reused)                            │
//! │  Step 4: PKCS#7 pad to a multiple of 16 bytes                          │
//! │  Step 5: AES-CBC(key, iv, padded)                                      │
//! │  Step 6: Base64(ciphertext)                                            │
//! │                                                                         │
//! │  Output: (ciphertext, iv, key) all base64                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decryption reverses the flow. A padding mismatch fails with
//! [`Error::InvalidPadding`] and nothing else; callers outside the crypto
//! layer only ever see [`Error::DecryptionFailed`].
//!
//! CBC carries no authentication tag. A wrong key is detected through the
//! padding check and the UTF-8 check on the recovered text.

use aes::cipher::block_padding::{NoPadding, Pkcs7, RawPadding};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::Serialize;
use zeroize::Zeroizing;

use super::keys::{AesKeySize, SymmetricKey};
use super::trace::{StepRecord, StepTracer};
use super::Decrypted;
use crate::error::{Error, Result};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// CBC IV size in bytes
pub const IV_SIZE: usize = 16;

/// Output of [`encrypt`]
#[derive(Debug, Clone, Serialize)]
pub struct SymmetricCiphertext {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// The key used, base64 when serialized
    pub key: SymmetricKey,
    /// Size of the key used
    pub key_size: AesKeySize,
    /// Trace of the operation
    pub steps: Vec<StepRecord>,
}

/// Encrypt `plaintext` with AES-CBC.
///
/// When `key` is `None` a random key of `key_size` is generated. A supplied
/// key carries its own size and `key_size` is ignored.
pub fn encrypt(
    plaintext: &str,
    key: Option<&SymmetricKey>,
    key_size: AesKeySize,
) -> Result<SymmetricCiphertext> {
    let key = match key {
        Some(key) => key.clone(),
        None => SymmetricKey::generate(key_size),
    };

    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut tracer = StepTracer::new();
    tracer.text("Original message", plaintext);
    tracer.secret(format!("AES-{} key", key.size().bits()), key.as_bytes());
    tracer.hex("Random IV", &iv);

    let padded = Zeroizing::new(pkcs7_pad(plaintext.as_bytes()));
    tracer.hex("PKCS#7 padded plaintext", &padded);

    let raw = cbc_encrypt(key.as_bytes(), &iv, &padded)?;
    tracer.hex("AES-CBC ciphertext", &raw);

    let ciphertext = BASE64.encode(&raw);
    tracer.base64("Base64 ciphertext", &ciphertext, raw.len());

    Ok(SymmetricCiphertext {
        ciphertext,
        iv: BASE64.encode(iv),
        key_size: key.size(),
        key,
        steps: tracer.finish(),
    })
}

/// Decrypt a base64 AES-CBC ciphertext
pub fn decrypt(ciphertext: &str, iv: &str, key: &SymmetricKey) -> Result<Decrypted> {
    let raw = BASE64.decode(ciphertext.trim())?;
    if raw.is_empty() || raw.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidInput(format!(
            "ciphertext must be a non-empty multiple of {} bytes",
            BLOCK_SIZE
        )));
    }

    let iv = BASE64.decode(iv.trim())?;
    let iv: [u8; IV_SIZE] = iv
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("IV must be {} bytes", IV_SIZE)))?;

    let mut tracer = StepTracer::new();
    tracer.base64("Base64 ciphertext", ciphertext.trim(), raw.len());
    tracer.hex("Decoded ciphertext", &raw);
    tracer.hex("IV", &iv);
    tracer.secret(format!("AES-{} key", key.size().bits()), key.as_bytes());

    let padded = Zeroizing::new(cbc_decrypt(key.as_bytes(), &iv, &raw)?);
    let unpadded = pkcs7_unpad(&padded)?;
    tracer.hex("Padding removed", unpadded);

    let plaintext = String::from_utf8(unpadded.to_vec()).map_err(|_| Error::DecryptionFailed)?;
    tracer.text("Recovered message", &plaintext);

    Ok(Decrypted {
        plaintext,
        steps: tracer.finish(),
    })
}

// ============================================================================
// PRIMITIVES
// ============================================================================

/// Pad through the final block only, so the trace can show the padded bytes
fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let full = data.len() - data.len() % BLOCK_SIZE;
    let tail = data.len() - full;

    let mut last = Zeroizing::new([0u8; BLOCK_SIZE]);
    last[..tail].copy_from_slice(&data[full..]);
    Pkcs7::raw_pad(last.as_mut_slice(), tail);

    let mut out = Vec::with_capacity(full + BLOCK_SIZE);
    out.extend_from_slice(&data[..full]);
    out.extend_from_slice(last.as_slice());
    out
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8]> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidPadding);
    }

    let body = data.len() - BLOCK_SIZE;
    let kept = Pkcs7::raw_unpad(&data[body..])
        .map_err(|_| Error::InvalidPadding)?
        .len();
    Ok(&data[..body + kept])
}

fn cbc_encrypt(key: &[u8], iv: &[u8; IV_SIZE], padded: &[u8]) -> Result<Vec<u8>> {
    let bad_key = || Error::InvalidKey("AES key must be 16, 24 or 32 bytes".into());
    let out = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .encrypt_padded_vec_mut::<NoPadding>(padded),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .encrypt_padded_vec_mut::<NoPadding>(padded),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .encrypt_padded_vec_mut::<NoPadding>(padded),
        _ => return Err(bad_key()),
    };
    Ok(out)
}

fn cbc_decrypt(key: &[u8], iv: &[u8; IV_SIZE], raw: &[u8]) -> Result<Vec<u8>> {
    let bad_key = || Error::InvalidKey("AES key must be 16, 24 or 32 bytes".into());
    let out = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .decrypt_padded_vec_mut::<NoPadding>(raw),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .decrypt_padded_vec_mut::<NoPadding>(raw),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| bad_key())?
            .decrypt_padded_vec_mut::<NoPadding>(raw),
        _ => return Err(bad_key()),
    };
    out.map_err(|_| Error::DecryptionFailed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::StepType;

    #[test]
    fn test_roundtrip_all_key_sizes() {
        for size in [AesKeySize::Aes128, AesKeySize::Aes192, AesKeySize::Aes256] {
            let enc = encrypt("Hello, CBC!", None, size).unwrap();
            assert_eq!(enc.key_size, size);
            assert_eq!(enc.key.as_bytes().len(), size.bytes());

            let dec = decrypt(&enc.ciphertext, &enc.iv, &enc.key).unwrap();
            assert_eq!(dec.plaintext, "Hello, CBC!");
        }
    }

    #[test]
    fn test_roundtrip_empty_and_block_aligned() {
        for text in ["", "exactly16bytes!!", "ünïcødé ✓"] {
            let enc = encrypt(text, None, AesKeySize::Aes256).unwrap();
            let dec = decrypt(&enc.ciphertext, &enc.iv, &enc.key).unwrap();
            assert_eq!(dec.plaintext, text);
        }
    }

    #[test]
    fn test_block_aligned_input_gets_full_padding_block() {
        let enc = encrypt("exactly16bytes!!", None, AesKeySize::Aes128).unwrap();
        let raw = BASE64.decode(&enc.ciphertext).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn test_fresh_iv_every_call() {
        let key = SymmetricKey::generate(AesKeySize::Aes256);
        let a = encrypt("same text", Some(&key), AesKeySize::Aes256).unwrap();
        let b = encrypt("same text", Some(&key), AesKeySize::Aes256).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_supplied_key_is_used() {
        let key = SymmetricKey::generate(AesKeySize::Aes128);
        let enc = encrypt("hi", Some(&key), AesKeySize::Aes256).unwrap();
        assert_eq!(enc.key_size, AesKeySize::Aes128);
        assert_eq!(enc.key.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_key_fails() {
        let enc = encrypt("secret message here", None, AesKeySize::Aes256).unwrap();
        let wrong = SymmetricKey::generate(AesKeySize::Aes256);

        let err = decrypt(&enc.ciphertext, &enc.iv, &wrong).unwrap_err().sanitized();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[test]
    fn test_tampered_padding_reports_invalid_padding() {
        let key = SymmetricKey::from_bytes(&[7u8; 16]).unwrap();
        let iv = [0u8; IV_SIZE];
        // Last byte 0x00 is never valid PKCS#7.
        let raw = cbc_encrypt(key.as_bytes(), &iv, &[0u8; 16]).unwrap();

        let err = decrypt(&BASE64.encode(raw), &BASE64.encode(iv), &key).unwrap_err();
        assert!(matches!(err, Error::InvalidPadding));
    }

    #[test]
    fn test_malformed_inputs() {
        let key = SymmetricKey::generate(AesKeySize::Aes256);
        let iv = BASE64.encode([0u8; IV_SIZE]);

        assert!(matches!(
            decrypt("***", &iv, &key),
            Err(Error::InvalidEncoding(_))
        ));
        assert!(matches!(
            decrypt(&BASE64.encode([1u8; 15]), &iv, &key),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            decrypt(&BASE64.encode([1u8; 16]), &BASE64.encode([0u8; 8]), &key),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_trace_order() {
        let enc = encrypt("trace me", None, AesKeySize::Aes192).unwrap();
        let kinds: Vec<StepType> = enc.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepType::Text,
                StepType::HexPartial,
                StepType::Hex,
                StepType::Hex,
                StepType::Hex,
                StepType::Base64,
            ]
        );
        assert_eq!(enc.steps.first().unwrap().data, "trace me");
        assert_eq!(enc.steps.last().unwrap().data, enc.ciphertext);
    }

    #[test]
    fn test_trace_never_contains_full_key() {
        let enc = encrypt("trace me", None, AesKeySize::Aes256).unwrap();
        let full_hex = hex::encode(enc.key.as_bytes());
        let full_b64 = enc.key.to_base64();

        for step in &enc.steps {
            assert!(!step.data.contains(&full_hex));
            assert!(!step.data.contains(&full_b64));
        }
    }

    #[test]
    fn test_pkcs7_unpad_rejects_bad_tails() {
        let mut block = [1u8; BLOCK_SIZE];
        assert!(pkcs7_unpad(&[]).is_err());
        assert!(pkcs7_unpad(&block[..4]).is_err());

        block[15] = 0;
        assert!(pkcs7_unpad(&block).is_err());
        block[15] = 17;
        assert!(pkcs7_unpad(&block).is_err());
        block[15] = 3;
        assert!(pkcs7_unpad(&block).is_err());

        block[13..].copy_from_slice(&[3, 3, 3]);
        assert_eq!(pkcs7_unpad(&block).unwrap(), &[1u8; 13][..]);
    }

    #[test]
    fn test_padding_matches_cbc_crate() {
        let key = [9u8; 32];
        let iv = [4u8; IV_SIZE];
        for text in ["", "short", "exactly16bytes!!", "a little over one block"] {
            let padded = pkcs7_pad(text.as_bytes());
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            assert_eq!(pkcs7_unpad(&padded).unwrap(), text.as_bytes());

            let ours = cbc_encrypt(&key, &iv, &padded).unwrap();
            let theirs = cbc::Encryptor::<Aes256>::new_from_slices(&key, &iv)
                .unwrap()
                .encrypt_padded_vec_mut::<Pkcs7>(text.as_bytes());
            assert_eq!(ours, theirs);
        }
    }
}
