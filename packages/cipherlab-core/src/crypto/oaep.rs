//! EME-OAEP encoding (SHA-256, MGF1-SHA-256, empty label).
//!
//! The padded block is produced here rather than inside the `rsa` crate so
//! that the encryptor can show it in its trace before exponentiation.
//! Decryption goes through `rsa::Oaep`, which checks the same layout.
//!
//! ```text
//!   DB = lHash || PS (zeros) || 0x01 || M                 k - hLen - 1 bytes
//!   maskedDB   = DB   xor MGF1(seed, k - hLen - 1)
//!   maskedSeed = seed xor MGF1(maskedDB, hLen)
//!   EM = 0x00 || maskedSeed || maskedDB                   k bytes
//! ```

use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// SHA-256 output length
pub const HASH_LEN: usize = 32;

/// Largest message that fits a modulus of `k` bytes
pub fn max_message_len(k: usize) -> usize {
    k.saturating_sub(2 * HASH_LEN + 2)
}

/// Encode `message` into a `k`-byte OAEP block
pub fn encode(message: &[u8], k: usize) -> Result<Zeroizing<Vec<u8>>> {
    let max = max_message_len(k);
    if message.len() > max {
        return Err(Error::MessageTooLarge {
            size: message.len(),
            max,
        });
    }

    let db_len = k - HASH_LEN - 1;
    let mut db = Zeroizing::new(vec![0u8; db_len]);
    db[..HASH_LEN].copy_from_slice(&Sha256::digest(b""));
    db[db_len - message.len() - 1] = 0x01;
    db[db_len - message.len()..].copy_from_slice(message);

    let mut seed = Zeroizing::new([0u8; HASH_LEN]);
    rand::rngs::OsRng.fill_bytes(&mut seed[..]);

    xor_in_place(&mut db, &mgf1(&seed[..], db_len));
    xor_in_place(&mut seed[..], &mgf1(&db, HASH_LEN));

    let mut em = Zeroizing::new(Vec::with_capacity(k));
    em.push(0x00);
    em.extend_from_slice(&seed[..]);
    em.extend_from_slice(&db);
    Ok(em)
}

fn mgf1(seed: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(len + HASH_LEN));
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn xor_in_place(target: &mut [u8], mask: &[u8]) {
    for (t, m) in target.iter_mut().zip(mask) {
        *t ^= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_per_key_size() {
        assert_eq!(max_message_len(256), 190);
        assert_eq!(max_message_len(384), 318);
        assert_eq!(max_message_len(512), 446);
    }

    #[test]
    fn test_encoded_block_shape() {
        let em = encode(b"hello", 256).unwrap();
        assert_eq!(em.len(), 256);
        assert_eq!(em[0], 0x00);
    }

    #[test]
    fn test_encoding_is_randomized() {
        let a = encode(b"hello", 256).unwrap();
        let b = encode(b"hello", 256).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let err = encode(&[0u8; 191], 256).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 191, max: 190 }));
        assert!(encode(&[0u8; 190], 256).is_ok());
    }

    #[test]
    fn test_mgf1_length() {
        assert_eq!(mgf1(b"seed", 5).len(), 5);
        assert_eq!(mgf1(b"seed", 100).len(), 100);
        assert_eq!(&mgf1(b"seed", 100)[..5], mgf1(b"seed", 5).as_slice());
    }
}
