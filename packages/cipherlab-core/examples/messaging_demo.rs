//! # Messaging Demo
//!
//! This example drives the JSON API the way an HTTP front end would:
//! 1. Alice and Bob get key pairs
//! 2. Alice sends Bob one message per scheme
//! 3. Bob reads his inbox and decrypts everything
//! 4. Mallory tries to decrypt a message that is not hers
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=cipherlab::audit=info cargo run --example messaging_demo
//! ```

use cipherlab_core::{dispatch, CipherEngine, EngineConfig};
use serde_json::json;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cipherlab=info,cipherlab_core=info".into()),
        )
        .init();

    println!("=================================================");
    println!("          CIPHERLAB MESSAGING DEMO");
    println!("=================================================\n");

    let engine = CipherEngine::new(EngineConfig::from_env()).expect("Failed to start engine");

    // =========================================================================
    // STEP 1: Key pairs
    // =========================================================================
    println!("1. Creating key pairs for Alice and Bob...\n");

    for user in ["alice", "bob"] {
        let response = dispatch(&engine, "POST", "/users/keys", Some(user), r#"{"key_size": 2048}"#).await;
        println!("   {} -> {} (created: {})", user, response.status, response.body["created"]);
    }
    println!();

    // =========================================================================
    // STEP 2: Send
    // =========================================================================
    println!("2. Alice sends Bob one message per scheme...\n");

    let mut sent = Vec::new();
    for (scheme, text) in [
        ("AES", "Lunch at noon?"),
        ("RSA", "The vault code is 0451"),
        ("HYBRID", "A much longer letter that RSA alone could never carry. "),
    ] {
        let body = json!({ "recipient_username": "bob", "plaintext": text, "encryption_type": scheme });
        let response = dispatch(&engine, "POST", "/messages/send", Some("alice"), &body.to_string()).await;
        println!(
            "   {:<6} -> {} id={} algorithm={} steps={}",
            scheme,
            response.status,
            response.body["id"],
            response.body["algorithm"],
            response.body["encryption_steps"].as_array().map_or(0, Vec::len),
        );
        sent.push((
            response.body["id"].as_str().unwrap_or_default().to_string(),
            response.body.get("shared_key").cloned(),
        ));
    }
    println!();

    // =========================================================================
    // STEP 3: Bob's inbox
    // =========================================================================
    println!("3. Bob reads his inbox...\n");

    let inbox = dispatch(&engine, "GET", "/messages/inbox", Some("bob"), "").await;
    println!("   Unread: {}", inbox.body["unread_count"]);
    for message in inbox.body["messages"].as_array().into_iter().flatten() {
        println!("   [{}] {}", message["encryption_type"], message["preview"]);
    }
    println!();

    for (id, shared_key) in &sent {
        let body = match shared_key {
            Some(key) => json!({ "shared_key": key }),
            None => json!({}),
        };
        let path = format!("/messages/{}/decrypt", id);
        let response = dispatch(&engine, "POST", &path, Some("bob"), &body.to_string()).await;
        println!(
            "   {} -> {} (signature valid: {})",
            response.body["plaintext"], response.status, response.body["signature_valid"]
        );
    }
    println!();

    // =========================================================================
    // STEP 4: Mallory
    // =========================================================================
    println!("4. Mallory tries to read Bob's mail...\n");

    let path = format!("/messages/{}/decrypt", sent[1].0);
    let response = dispatch(&engine, "POST", &path, Some("mallory"), "").await;
    println!("   {} {}", response.status, response.body["error"]["message"]);
}
