//! # Database Schema
//!
//! SQL schema definitions for the cipherlab database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │    user_keys    │    │    messages     │      │  message_reads  │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ username        │    │ id              │◄─────│ message_id      │    │
//! │  │ public_key      │    │ sender          │      │ read_at         │    │
//! │  │ private_key     │    │ recipient       │      └─────────────────┘    │
//! │  │ key_size        │    │ encryption_type │                             │
//! │  │ created_at      │    │ ciphertext      │                             │
//! │  └─────────────────┘    │ iv              │                             │
//! │                         │ wrapped_key     │                             │
//! │                         │ signature       │                             │
//! │                         │ key_size        │                             │
//! │                         │ created_at      │                             │
//! │                         └─────────────────┘                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- User key pairs
-- One row per user, written once and never rotated
CREATE TABLE IF NOT EXISTS user_keys (
    username TEXT PRIMARY KEY,
    -- SPKI PEM
    public_key TEXT NOT NULL,
    -- PKCS#8 PEM
    private_key TEXT NOT NULL,
    -- Modulus size in bits (2048, 3072, 4096)
    key_size INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

-- Encrypted messages
-- Rows are immutable once inserted
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    -- 'AES', 'RSA' or 'HYBRID'
    encryption_type TEXT NOT NULL CHECK (encryption_type IN ('AES', 'RSA', 'HYBRID')),
    -- Base64 ciphertext
    ciphertext TEXT NOT NULL,
    -- Base64 IV (AES and HYBRID only)
    iv TEXT,
    -- Base64 RSA-wrapped session key (HYBRID only)
    wrapped_key TEXT,
    -- Base64 RSA-PSS signature by the sender, if any
    signature TEXT,
    key_size INTEGER NOT NULL,
    -- Unix milliseconds
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender, created_at);

-- Read receipts
-- Kept apart from messages so the message rows never change
CREATE TABLE IF NOT EXISTS message_reads (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    read_at INTEGER NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_cleanly_twice() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
    }

    #[test]
    fn test_encryption_type_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();

        let result = conn.execute(
            "INSERT INTO messages (id, sender, recipient, encryption_type, ciphertext, key_size, created_at)
             VALUES ('m', 'a', 'b', 'ROT13', 'x', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
