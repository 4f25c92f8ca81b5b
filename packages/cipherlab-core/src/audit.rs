//! # Audit Trail
//!
//! Security-relevant events, emitted as structured `tracing` events on the
//! `cipherlab::audit` target. Hosts route that target wherever they keep
//! audit logs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           AUDIT EVENTS                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KEY_GENERATE     key pair or AES key created                          │
//! │  ENCRYPT          standalone AES / RSA encryption                      │
//! │  DECRYPT          standalone AES / RSA decryption                      │
//! │  SIGN             signature produced                                   │
//! │  VERIFY           signature checked (valid or not)                     │
//! │  MESSAGE_SEND     message stored for a recipient                       │
//! │  MESSAGE_READ     message decrypted by its recipient                   │
//! │  ACCESS_DENIED    non-recipient decrypt, missing identity              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries carry ids, sizes, algorithms and outcomes. Metadata fields whose
//! names mark secret material are replaced before anything is logged.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Error;

/// Target every audit event is emitted on
pub const AUDIT_TARGET: &str = "cipherlab::audit";

/// Metadata names that never reach the log with their value
const REDACTED_FIELDS: &[&str] = &[
    "plaintext",
    "message",
    "key",
    "shared_key",
    "session_key",
    "private_key",
    "public_key",
    "signature",
];

const REDACTED: &str = "[redacted]";

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// Key material was generated
    KeyGenerate,
    /// Standalone encryption
    Encrypt,
    /// Standalone decryption
    Decrypt,
    /// Signature produced
    Sign,
    /// Signature checked
    Verify,
    /// Message stored
    MessageSend,
    /// Message opened by its recipient
    MessageRead,
    /// Request refused for lack of identity or rights
    AccessDenied,
}

impl AuditEvent {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyGenerate => "KEY_GENERATE",
            Self::Encrypt => "ENCRYPT",
            Self::Decrypt => "DECRYPT",
            Self::Sign => "SIGN",
            Self::Verify => "VERIFY",
            Self::MessageSend => "MESSAGE_SEND",
            Self::MessageRead => "MESSAGE_READ",
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }

    fn default_severity(&self) -> Severity {
        match self {
            Self::AccessDenied => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly an entry is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Normal operation
    Info,
    /// Refused or failed request
    Warning,
    /// Infrastructure failure
    Error,
}

/// One audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// What happened
    pub event: AuditEvent,
    /// How serious it is
    pub severity: Severity,
    /// Acting user, when known
    pub actor: Option<String>,
    /// Short human description
    pub description: String,
    /// Extra structured fields
    pub metadata: Map<String, Value>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl AuditEntry {
    /// Start an entry with the event's default severity
    pub fn new(event: AuditEvent, description: impl Into<String>) -> Self {
        Self {
            event,
            severity: event.default_severity(),
            actor: None,
            description: description.into(),
            metadata: Map::new(),
            timestamp: crate::time::now_timestamp_millis(),
        }
    }

    /// Set the acting user
    pub fn actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    /// Override the severity
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a metadata field
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = if REDACTED_FIELDS.contains(&name) {
            Value::String(REDACTED.into())
        } else {
            value.into()
        };
        self.metadata.insert(name.to_string(), value);
        self
    }

    /// Record that the operation failed with `err`.
    ///
    /// Retryable failures are logged as errors, the rest as warnings.
    pub fn failed(self, err: &Error) -> Self {
        let severity = if err.is_recoverable() {
            Severity::Error
        } else {
            Severity::Warning
        };
        self.severity(severity)
            .with("outcome", "failure")
            .with("error_kind", err.kind())
            .with("error_code", err.code())
    }

    /// Log the entry and hand it back
    pub fn emit(self) -> Self {
        let metadata = Value::Object(self.metadata.clone());
        let actor = self.actor.as_deref().unwrap_or("-");

        match self.severity {
            Severity::Info => tracing::info!(
                target: AUDIT_TARGET,
                event = %self.event,
                actor,
                metadata = %metadata,
                "{}",
                self.description
            ),
            Severity::Warning => tracing::warn!(
                target: AUDIT_TARGET,
                event = %self.event,
                actor,
                metadata = %metadata,
                "{}",
                self.description
            ),
            Severity::Error => tracing::error!(
                target: AUDIT_TARGET,
                event = %self.event,
                actor,
                metadata = %metadata,
                "{}",
                self.description
            ),
        }
        self
    }
}

/// Emit a successful event
pub fn record(event: AuditEvent, actor: Option<&str>, description: impl Into<String>) -> AuditEntry {
    let mut entry = AuditEntry::new(event, description);
    entry.actor = actor.map(str::to_string);
    entry.with("outcome", "success").emit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(AuditEvent::KeyGenerate.as_str(), "KEY_GENERATE");
        assert_eq!(AuditEvent::AccessDenied.to_string(), "ACCESS_DENIED");
        assert_eq!(
            serde_json::to_string(&AuditEvent::MessageRead).unwrap(),
            "\"MESSAGE_READ\""
        );
    }

    #[test]
    fn test_default_severity() {
        assert_eq!(AuditEntry::new(AuditEvent::Encrypt, "x").severity, Severity::Info);
        assert_eq!(
            AuditEntry::new(AuditEvent::AccessDenied, "x").severity,
            Severity::Warning
        );
    }

    #[test]
    fn test_secret_fields_are_redacted() {
        let entry = AuditEntry::new(AuditEvent::Encrypt, "AES encrypt")
            .with("key", "c2VjcmV0IGtleSBtYXRlcmlhbA==")
            .with("plaintext", "attack at dawn")
            .with("key_size", 256);

        assert_eq!(entry.metadata["key"], REDACTED);
        assert_eq!(entry.metadata["plaintext"], REDACTED);
        assert_eq!(entry.metadata["key_size"], 256);

        let logged = serde_json::to_string(&entry).unwrap();
        assert!(!logged.contains("attack at dawn"));
        assert!(!logged.contains("c2VjcmV0"));
    }

    #[test]
    fn test_failed_entry() {
        let entry = AuditEntry::new(AuditEvent::Decrypt, "AES decrypt").failed(&Error::DecryptionFailed);
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.metadata["error_kind"], "decryption_failed");
        assert_eq!(entry.metadata["outcome"], "failure");

        let entry = AuditEntry::new(AuditEvent::KeyGenerate, "RSA keygen")
            .failed(&Error::TimedOut("keygen".into()));
        assert_eq!(entry.severity, Severity::Error);
    }

    #[test]
    fn test_record_sets_actor_and_outcome() {
        let entry = record(AuditEvent::MessageSend, Some("alice"), "Message sent");
        assert_eq!(entry.actor.as_deref(), Some("alice"));
        assert_eq!(entry.metadata["outcome"], "success");
        assert!(entry.timestamp > 0);
    }
}
