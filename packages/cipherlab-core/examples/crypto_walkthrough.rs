//! # Crypto Walkthrough
//!
//! This example runs each scheme once and prints its step trace:
//! 1. AES-256-CBC encrypt and decrypt
//! 2. RSA-2048-OAEP encrypt and decrypt
//! 3. RSA-PSS sign and verify (plus a tampered message)
//! 4. Hybrid encryption of a payload RSA alone cannot carry
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=cipherlab=info cargo run --example crypto_walkthrough
//! ```

use cipherlab_core::crypto::{asymmetric, hybrid, signing, symmetric, StepRecord};
use cipherlab_core::{AesKeySize, RsaKeySize};

fn print_steps(steps: &[StepRecord]) {
    for step in steps {
        match step.length {
            Some(len) => println!("   {:>2}. {} [{} bytes]", step.step, step.name, len),
            None => println!("   {:>2}. {}", step.step, step.name),
        }
        println!("       {}", step.data);
    }
    println!();
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cipherlab_core=info".into()),
        )
        .init();

    println!("=================================================");
    println!("          CIPHERLAB CRYPTO WALKTHROUGH");
    println!("=================================================\n");

    // =========================================================================
    // STEP 1: AES-CBC
    // =========================================================================
    println!("1. AES-256-CBC...\n");

    let sealed = symmetric::encrypt("Hello, AES!", None, AesKeySize::Aes256)
        .expect("AES encryption failed");
    print_steps(&sealed.steps);

    let opened = symmetric::decrypt(&sealed.ciphertext, &sealed.iv, &sealed.key)
        .expect("AES decryption failed");
    println!("   Decrypted: {}\n", opened.plaintext);

    // =========================================================================
    // STEP 2: RSA-OAEP
    // =========================================================================
    println!("2. RSA-2048-OAEP (generating a key pair, this takes a moment)...\n");

    let pair = asymmetric::generate(RsaKeySize::Rsa2048).expect("Key generation failed");
    println!(
        "   Capacity: {} bytes per message\n",
        asymmetric::max_plaintext_len(pair.key_size)
    );

    let sealed = asymmetric::encrypt("Hello, RSA!", &pair.public_key).expect("RSA encryption failed");
    print_steps(&sealed.steps);

    let opened = asymmetric::decrypt(&sealed.ciphertext, pair.private_key.expose())
        .expect("RSA decryption failed");
    println!("   Decrypted: {}\n", opened.plaintext);

    // =========================================================================
    // STEP 3: RSA-PSS signatures
    // =========================================================================
    println!("3. RSA-PSS-SHA256 signature...\n");

    let signed = signing::sign("I owe Bob 10 coins", pair.private_key.expose())
        .expect("Signing failed");
    print_steps(&signed.steps);

    let genuine = signing::verify("I owe Bob 10 coins", &signed.signature, &pair.public_key)
        .expect("Verification failed");
    let forged = signing::verify("I owe Bob 1000 coins", &signed.signature, &pair.public_key)
        .expect("Verification failed");
    println!("   Original message valid: {}", genuine.valid);
    println!("   Tampered message valid: {}\n", forged.valid);

    // =========================================================================
    // STEP 4: Hybrid
    // =========================================================================
    println!("4. Hybrid RSA-OAEP + AES-CBC on a 2,000 byte payload...\n");

    let payload = "hybrid ".repeat(286);
    assert!(asymmetric::encrypt(&payload, &pair.public_key).is_err());

    let sealed = hybrid::encrypt(&payload, &pair.public_key).expect("Hybrid encryption failed");
    print_steps(&sealed.steps);

    let opened = hybrid::decrypt(
        &sealed.ciphertext,
        &sealed.iv,
        &sealed.wrapped_key,
        pair.private_key.expose(),
    )
    .expect("Hybrid decryption failed");
    println!("   Round trip intact: {}", opened.plaintext == payload);
}
