//! # Step Tracing
//!
//! Every cipher and signature operation records the intermediate values it
//! produces so a UI can replay the algorithm step by step.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TRACE LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  operation starts ──► StepTracer::new()                                │
//! │                           │                                             │
//! │                           ├── text / hex / base64 / ... (append only)  │
//! │                           │                                             │
//! │  nested operation ──► its own tracer ──► finish() ──► absorb()         │
//! │                           │                                             │
//! │  operation returns ◄── finish() → Vec<StepRecord>                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A tracer is owned by exactly one operation. It is never stored, never
//! shared between threads and never persisted; it only shapes the response.

use serde::{Deserialize, Serialize};

/// Leading bytes shown for a secret value
const SECRET_PREVIEW_BYTES: usize = 4;

/// Leading bytes shown for long public values (ciphertexts, padded blocks)
const PREVIEW_BYTES: usize = 32;

/// Leading characters shown for PEM material
const PEM_PREVIEW_CHARS: usize = 80;

/// How the `data` field of a step should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Human-readable text
    Text,
    /// Full hex dump
    Hex,
    /// Truncated hex dump
    HexPartial,
    /// Base64 string
    Base64,
    /// Truncated PEM block
    PemPartial,
    /// Explanatory note, no data
    Info,
}

/// A single observation in a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the trace
    pub step: u32,
    /// What happened
    pub name: String,
    /// Rendering hint for `data`
    #[serde(rename = "type")]
    pub kind: StepType,
    /// The observed value
    pub data: String,
    /// Length in bytes of the underlying value, when meaningful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Append-only recorder for one operation
#[derive(Debug, Default)]
pub struct StepTracer {
    steps: Vec<StepRecord>,
}

impl StepTracer {
    /// Start an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step with an explicit type
    pub fn record(
        &mut self,
        name: impl Into<String>,
        kind: StepType,
        data: impl Into<String>,
        length: Option<usize>,
    ) {
        let step = self.steps.len() as u32 + 1;
        self.steps.push(StepRecord {
            step,
            name: name.into(),
            kind,
            data: data.into(),
            length,
        });
    }

    /// Record readable text
    pub fn text(&mut self, name: impl Into<String>, text: &str) {
        self.record(name, StepType::Text, text, Some(text.len()));
    }

    /// Record the full hex dump of `bytes`
    pub fn hex(&mut self, name: impl Into<String>, bytes: &[u8]) {
        self.record(name, StepType::Hex, hex::encode(bytes), Some(bytes.len()));
    }

    /// Record a secret, showing only its leading bytes
    pub fn secret(&mut self, name: impl Into<String>, bytes: &[u8]) {
        self.record(name, StepType::HexPartial, secret_hex(bytes), Some(bytes.len()));
    }

    /// Record a long public value, showing only its leading bytes
    pub fn hex_preview(&mut self, name: impl Into<String>, bytes: &[u8]) {
        self.record(name, StepType::HexPartial, preview_hex(bytes), Some(bytes.len()));
    }

    /// Record an already-encoded base64 string
    pub fn base64(&mut self, name: impl Into<String>, encoded: &str, raw_len: usize) {
        self.record(name, StepType::Base64, encoded, Some(raw_len));
    }

    /// Record the head of a PEM block
    pub fn pem(&mut self, name: impl Into<String>, pem: &str) {
        self.record(name, StepType::PemPartial, pem_preview(pem), Some(pem.len()));
    }

    /// Record an explanatory note
    pub fn info(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, StepType::Info, detail, None);
    }

    /// Append the finished trace of a nested operation, renumbering it
    pub fn absorb(&mut self, steps: Vec<StepRecord>) {
        for step in steps {
            self.record(step.name, step.kind, step.data, step.length);
        }
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Close the trace and hand the records to the caller
    pub fn finish(self) -> Vec<StepRecord> {
        self.steps
    }
}

fn secret_hex(bytes: &[u8]) -> String {
    let edge = SECRET_PREVIEW_BYTES.min(bytes.len() / 2);
    format!("{}...", hex::encode(&bytes[..edge]))
}

fn preview_hex(bytes: &[u8]) -> String {
    if bytes.len() <= PREVIEW_BYTES {
        return hex::encode(bytes);
    }
    format!("{}...", hex::encode(&bytes[..PREVIEW_BYTES]))
}

fn pem_preview(pem: &str) -> String {
    let head: String = pem.chars().take(PEM_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_numbered_from_one() {
        let mut tracer = StepTracer::new();
        tracer.text("original message", "hi");
        tracer.hex("bytes", b"hi");
        tracer.info("note", "nothing to see");

        let steps = tracer.finish();
        let numbers: Vec<u32> = steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(steps[1].data, "6869");
        assert_eq!(steps[1].length, Some(2));
        assert_eq!(steps[2].length, None);
    }

    #[test]
    fn test_absorb_renumbers_nested_trace() {
        let mut inner = StepTracer::new();
        inner.text("inner a", "a");
        inner.text("inner b", "b");

        let mut outer = StepTracer::new();
        outer.info("frame", "start");
        outer.absorb(inner.finish());
        outer.info("frame", "end");

        let steps = outer.finish();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[1].name, "inner a");
        assert_eq!(steps[1].step, 2);
        assert_eq!(steps[3].step, 4);
    }

    #[test]
    fn test_secret_never_shows_whole_value() {
        let key = [0xABu8; 32];
        let mut tracer = StepTracer::new();
        tracer.secret("key", &key);

        let step = &tracer.finish()[0];
        assert_eq!(step.kind, StepType::HexPartial);
        assert_eq!(step.data, "abababab...");
        assert_eq!(step.length, Some(32));
    }

    #[test]
    fn test_preview_truncates_long_values_only() {
        let mut tracer = StepTracer::new();
        tracer.hex_preview("short", &[1, 2, 3]);
        tracer.hex_preview("long", &[7u8; 256]);

        let steps = tracer.finish();
        assert_eq!(steps[0].data, "010203");
        assert!(steps[1].data.ends_with("..."));
        assert_eq!(steps[1].data.len(), PREVIEW_BYTES * 2 + 3);
    }

    #[test]
    fn test_step_type_serializes_snake_case() {
        let mut tracer = StepTracer::new();
        tracer.pem("public key", "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PUBLIC KEY-----\n");

        let json = serde_json::to_value(tracer.finish()).unwrap();
        assert_eq!(json[0]["type"], "pem_partial");
        assert_eq!(json[0]["step"], 1);
    }
}
