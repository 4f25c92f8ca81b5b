//! # JSON API
//!
//! Request routing for the HTTP-style contract. The transport (framework,
//! sessions, TLS) belongs to the host: it authenticates the caller, then
//! hands `(method, path, caller, body)` to [`dispatch`] and writes back the
//! returned status and JSON.
//!
//! ## Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/crypto/keys/generate` | key generation |
//! | POST | `/crypto/aes/encrypt` | AES-CBC encrypt |
//! | POST | `/crypto/aes/decrypt` | AES-CBC decrypt |
//! | POST | `/crypto/rsa/encrypt` | RSA-OAEP encrypt |
//! | POST | `/crypto/rsa/decrypt` | RSA-OAEP decrypt |
//! | POST | `/crypto/rsa/sign` | RSA-PSS sign |
//! | POST | `/crypto/rsa/verify` | RSA-PSS verify |
//! | GET | `/messages` | sent and received messages |
//! | GET | `/messages/{id}` | one message with decrypt hints |
//! | POST | `/messages/send` | send a message |
//! | GET | `/messages/inbox` | received messages |
//! | GET | `/messages/sent` | sent messages |
//! | POST | `/messages/{id}/decrypt` | decrypt a message |
//! | POST | `/users/keys` | give the caller a key pair |
//! | GET | `/users/{username}/public-key` | look up a public key |
//!
//! Every route requires an authenticated caller. Errors come back as
//! `{"error": {code, kind, message, recoverable}}`.

pub mod types;

use serde::de::DeserializeOwned;

pub use types::ApiResponse;
use types::*;

use crate::audit::{AuditEntry, AuditEvent};
use crate::crypto::{self, AesKeySize, RsaKeySize, SecretPem, SymmetricKey};
use crate::engine::CipherEngine;
use crate::error::{Error, Result};

/// Longest plaintext or message accepted, in characters
pub const MAX_PLAINTEXT_CHARS: usize = 10_000;

type DResult = Result<ApiResponse>;

// ============================================================================
// ROUTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    GenerateKeys,
    AesEncrypt,
    AesDecrypt,
    RsaEncrypt,
    RsaDecrypt,
    RsaSign,
    RsaVerify,
    SendMessage,
    ListMessages,
    GetMessage(&'a str),
    Inbox,
    Sent,
    DecryptMessage(&'a str),
    EnsureUserKeys,
    PublicKey(&'a str),
}

fn route<'a>(method: &str, path: &'a str) -> Result<Route<'a>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = method.to_ascii_uppercase();

    let found = match (method.as_str(), segments.as_slice()) {
        ("POST", ["crypto", "keys", "generate"]) => Some(Route::GenerateKeys),
        ("POST", ["crypto", "aes", "encrypt"]) => Some(Route::AesEncrypt),
        ("POST", ["crypto", "aes", "decrypt"]) => Some(Route::AesDecrypt),
        ("POST", ["crypto", "rsa", "encrypt"]) => Some(Route::RsaEncrypt),
        ("POST", ["crypto", "rsa", "decrypt"]) => Some(Route::RsaDecrypt),
        ("POST", ["crypto", "rsa", "sign"]) => Some(Route::RsaSign),
        ("POST", ["crypto", "rsa", "verify"]) => Some(Route::RsaVerify),
        ("POST", ["messages", "send"]) => Some(Route::SendMessage),
        ("GET", ["messages", "inbox"]) => Some(Route::Inbox),
        ("GET", ["messages", "sent"]) => Some(Route::Sent),
        ("GET", ["messages"]) => Some(Route::ListMessages),
        ("GET", ["messages", id]) => Some(Route::GetMessage(*id)),
        ("POST", ["messages", id, "decrypt"]) => Some(Route::DecryptMessage(*id)),
        ("POST", ["users", "keys"]) => Some(Route::EnsureUserKeys),
        ("GET", ["users", username, "public-key"]) => Some(Route::PublicKey(*username)),
        _ => None,
    };

    found.ok_or_else(|| Error::NotFound(format!("{} {}", method, path)))
}

// ============================================================================
// MAIN DISPATCHER
// ============================================================================

/// Handle one request.
///
/// `caller` is the username the transport authenticated, `None` when the
/// request carried no valid credentials.
pub async fn dispatch(
    engine: &CipherEngine,
    method: &str,
    path: &str,
    caller: Option<&str>,
    body: &str,
) -> ApiResponse {
    match handle(engine, method, path, caller, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(method, path, kind = e.kind(), "Request failed: {}", e);
            ApiResponse::error(e)
        }
    }
}

async fn handle(
    engine: &CipherEngine,
    method: &str,
    path: &str,
    caller: Option<&str>,
    body: &str,
) -> DResult {
    let route = route(method, path)?;

    let caller = match caller.map(str::trim).filter(|c| !c.is_empty()) {
        Some(caller) => caller,
        None => {
            AuditEntry::new(AuditEvent::AccessDenied, "Unauthenticated request")
                .with("path", path)
                .emit();
            return Err(Error::Unauthenticated);
        }
    };

    match route {
        // ── Crypto ──────────────────────────────────────────────────
        Route::GenerateKeys => generate_keys(engine, caller, body).await,
        Route::AesEncrypt => aes_encrypt(engine, caller, body).await,
        Route::AesDecrypt => aes_decrypt(engine, caller, body).await,
        Route::RsaEncrypt => rsa_encrypt(engine, caller, body).await,
        Route::RsaDecrypt => rsa_decrypt(engine, caller, body).await,
        Route::RsaSign => rsa_sign(engine, caller, body).await,
        Route::RsaVerify => rsa_verify(engine, caller, body).await,

        // ── Messaging ───────────────────────────────────────────────
        Route::SendMessage => send_message(engine, caller, body).await,
        Route::ListMessages => to_ok(&engine.list_messages(caller).await?),
        Route::GetMessage(id) => to_ok(&engine.get_message(id, caller).await?),
        Route::Inbox => to_ok(&engine.inbox(caller).await?),
        Route::Sent => to_ok(&engine.sent(caller).await?),
        Route::DecryptMessage(id) => decrypt_message(engine, caller, id, body).await,

        // ── Users ───────────────────────────────────────────────────
        Route::EnsureUserKeys => ensure_user_keys(engine, caller, body).await,
        Route::PublicKey(username) => {
            let stored = engine.public_key(username).await?;
            Ok(ApiResponse::ok(serde_json::json!({
                "username": username,
                "public_key": stored.public_key,
                "key_size": stored.key_size,
            })))
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse a request body. An empty body reads as `{}`.
fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| Error::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Reject empty and oversized text fields
fn check_text(field: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(Error::InvalidInput(format!("{} may not be blank", field)));
    }
    let chars = text.chars().count();
    if chars > MAX_PLAINTEXT_CHARS {
        return Err(Error::InvalidInput(format!(
            "{} is {} characters (max {})",
            field, chars, MAX_PLAINTEXT_CHARS
        )));
    }
    Ok(())
}

fn shared_key(encoded: Option<&str>) -> Result<Option<SymmetricKey>> {
    encoded
        .filter(|k| !k.trim().is_empty())
        .map(SymmetricKey::from_base64)
        .transpose()
}

fn to_ok<T: serde::Serialize>(value: &T) -> DResult {
    Ok(ApiResponse::ok(serde_json::to_value(value)?))
}

// ============================================================================
// CRYPTO HANDLERS
// ============================================================================

async fn generate_keys(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: GenerateKeysRequest = parse(body)?;
    let keys = engine.generate_keys(caller, req.algorithm, req.key_size).await?;
    to_ok(&keys)
}

async fn aes_encrypt(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: AesEncryptRequest = parse(body)?;
    check_text("plaintext", &req.plaintext)?;
    let key_size = req.key_size.map(AesKeySize::try_from).transpose()?;
    let key = shared_key(req.key.as_deref())?;

    let sealed = engine.aes_encrypt(caller, req.plaintext, key_size, key).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "ciphertext": sealed.ciphertext,
        "iv": sealed.iv,
        "key": sealed.key,
        "key_size": sealed.key_size,
        "algorithm": crypto::AES_ALGORITHM,
        "steps": sealed.steps,
    })))
}

async fn aes_decrypt(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: AesDecryptRequest = parse(body)?;
    let key = SymmetricKey::from_base64(&req.key)?;

    let opened = engine.aes_decrypt(caller, req.ciphertext, req.iv, key).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "plaintext": opened.plaintext,
        "algorithm": crypto::AES_ALGORITHM,
        "steps": opened.steps,
    })))
}

async fn rsa_encrypt(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: RsaEncryptRequest = parse(body)?;
    check_text("plaintext", &req.plaintext)?;

    let sealed = engine.rsa_encrypt(caller, req.plaintext, req.public_key).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "ciphertext": sealed.ciphertext,
        "key_size": sealed.key_size,
        "algorithm": crypto::rsa_algorithm(sealed.key_size),
        "steps": sealed.steps,
    })))
}

async fn rsa_decrypt(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: RsaDecryptRequest = parse(body)?;
    let private_key = SecretPem::new(req.private_key);

    let opened = engine.rsa_decrypt(caller, req.ciphertext, private_key).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "plaintext": opened.plaintext,
        "algorithm": "RSA-OAEP",
        "steps": opened.steps,
    })))
}

async fn rsa_sign(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: SignRequest = parse(body)?;
    check_text("message", &req.message)?;
    let private_key = SecretPem::new(req.private_key);

    let signed = engine.sign(caller, req.message, private_key).await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "signature": signed.signature,
        "message_hash": signed.message_hash,
        "algorithm": crypto::SIGNATURE_ALGORITHM,
        "steps": signed.steps,
    })))
}

async fn rsa_verify(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: VerifyRequest = parse(body)?;
    check_text("message", &req.message)?;

    let checked = engine
        .verify(caller, req.message, req.signature, req.public_key)
        .await?;
    Ok(ApiResponse::ok(serde_json::json!({
        "valid": checked.valid,
        "algorithm": crypto::SIGNATURE_ALGORITHM,
        "steps": checked.steps,
    })))
}

// ============================================================================
// MESSAGING HANDLERS
// ============================================================================

async fn send_message(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: SendMessageRequest = parse(body)?;
    check_text("plaintext", &req.plaintext)?;
    if req.recipient_username.trim().is_empty() {
        return Err(Error::InvalidInput("recipient_username may not be blank".into()));
    }
    let key = shared_key(req.shared_key.as_deref())?;

    let receipt = engine
        .send_message(
            caller,
            req.recipient_username.trim(),
            req.plaintext,
            req.encryption_type,
            key,
        )
        .await?;
    Ok(ApiResponse::created(serde_json::to_value(&receipt)?))
}

async fn decrypt_message(engine: &CipherEngine, caller: &str, id: &str, body: &str) -> DResult {
    let req: DecryptMessageRequest = parse(body)?;

    let opened = engine.decrypt_message(id, caller, req.shared_key).await?;
    to_ok(&opened)
}

async fn ensure_user_keys(engine: &CipherEngine, caller: &str, body: &str) -> DResult {
    let req: UserKeysRequest = parse(body)?;
    let key_size = req.key_size.map(RsaKeySize::try_from).transpose()?;

    let (stored, created) = engine.ensure_user_keys(caller, key_size).await?;
    let body = serde_json::json!({
        "public_key": stored.public_key,
        "key_size": stored.key_size,
        "created": created,
    });
    Ok(if created {
        ApiResponse::created(body)
    } else {
        ApiResponse::ok(body)
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine() -> CipherEngine {
        CipherEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_routing() {
        assert_eq!(route("POST", "/crypto/aes/encrypt").unwrap(), Route::AesEncrypt);
        assert_eq!(route("post", "/crypto/aes/encrypt/").unwrap(), Route::AesEncrypt);
        assert_eq!(route("GET", "/messages/inbox").unwrap(), Route::Inbox);
        assert_eq!(
            route("POST", "/messages/abc-123/decrypt").unwrap(),
            Route::DecryptMessage("abc-123")
        );
        assert_eq!(
            route("GET", "/users/bob/public-key").unwrap(),
            Route::PublicKey("bob")
        );
        assert_eq!(route("GET", "/messages/").unwrap(), Route::ListMessages);
        assert_eq!(
            route("GET", "/messages/abc-123").unwrap(),
            Route::GetMessage("abc-123")
        );
        assert_eq!(route("GET", "/messages/sent").unwrap(), Route::Sent);
        assert!(matches!(route("GET", "/crypto/aes/encrypt"), Err(Error::NotFound(_))));
        assert!(matches!(route("POST", "/messages"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unauthenticated() {
        let engine = engine();
        for caller in [None, Some(""), Some("   ")] {
            let response = dispatch(&engine, "GET", "/messages/inbox", caller, "").await;
            assert_eq!(response.status, 401);
            assert_eq!(response.body["error"]["kind"], "unauthenticated");
        }
    }

    #[tokio::test]
    async fn test_unknown_route_and_bad_json() {
        let engine = engine();
        let response = dispatch(&engine, "DELETE", "/messages/1", Some("alice"), "").await;
        assert_eq!(response.status, 404);

        let response = dispatch(&engine, "POST", "/crypto/aes/encrypt", Some("alice"), "{nope").await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["code"], 100);
    }

    #[tokio::test]
    async fn test_plaintext_limits() {
        let engine = engine();
        let long = serde_json::json!({ "plaintext": "a".repeat(MAX_PLAINTEXT_CHARS + 1) });
        let response = dispatch(
            &engine,
            "POST",
            "/crypto/aes/encrypt",
            Some("alice"),
            &long.to_string(),
        )
        .await;
        assert_eq!(response.status, 400);

        let blank = serde_json::json!({ "plaintext": "" });
        let response = dispatch(
            &engine,
            "POST",
            "/crypto/aes/encrypt",
            Some("alice"),
            &blank.to_string(),
        )
        .await;
        assert_eq!(response.status, 400);

        let max = serde_json::json!({ "plaintext": "a".repeat(MAX_PLAINTEXT_CHARS) });
        let response = dispatch(
            &engine,
            "POST",
            "/crypto/aes/encrypt",
            Some("alice"),
            &max.to_string(),
        )
        .await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_aes_round_trip_over_json() {
        let engine = engine();
        let response = dispatch(
            &engine,
            "POST",
            "/crypto/aes/encrypt",
            Some("alice"),
            r#"{"plaintext": "Hola mundo", "key_size": 192}"#,
        )
        .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["algorithm"], "AES-CBC");
        assert_eq!(response.body["key_size"], 192);
        assert_eq!(response.body["steps"][0]["type"], "text");

        let request = serde_json::json!({
            "ciphertext": response.body["ciphertext"],
            "iv": response.body["iv"],
            "key": response.body["key"],
        });
        let opened = dispatch(
            &engine,
            "POST",
            "/crypto/aes/decrypt",
            Some("bob"),
            &request.to_string(),
        )
        .await;
        assert_eq!(opened.status, 200);
        assert_eq!(opened.body["plaintext"], "Hola mundo");
    }

    #[tokio::test]
    async fn test_unsupported_key_size() {
        let engine = engine();
        let response = dispatch(
            &engine,
            "POST",
            "/crypto/keys/generate",
            Some("alice"),
            r#"{"algorithm": "RSA", "key_size": 1024}"#,
        )
        .await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["code"], 103);
    }

    #[tokio::test]
    async fn test_missing_public_key() {
        let engine = engine();
        let response = dispatch(&engine, "GET", "/users/nobody/public-key", Some("alice"), "").await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["kind"], "no_key_pair");
    }
}
