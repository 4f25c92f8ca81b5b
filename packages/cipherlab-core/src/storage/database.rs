//! # Database
//!
//! SQLite implementation of [`MessageStore`] and [`KeyStore`].
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │ MessageService  │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │  MessageStore / KeyStore traits                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  - Message insert / lookup / listing              │
//! │  │   (this file)   │  - Read receipts                                  │
//! │  │                 │  - Write-once user keys                           │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema;
use super::{KeyStore, MessageStore, StoredMessage, StoredPublicKey};
use crate::crypto::{KeyPair, RsaKeySize, SecretPem};
use crate::error::{Error, Result};
use crate::messaging::{EncryptedMessage, EncryptionType};

const MESSAGE_COLUMNS: &str = "m.id, m.sender, m.recipient, m.encryption_type, m.ciphertext, m.iv,
     m.wrapped_key, m.signature, m.key_size, m.created_at, r.message_id IS NOT NULL";

/// The SQLite database handle
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::Storage(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::Storage(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::Storage(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::Storage(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    fn list_where(&self, column: &str, user: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM messages m LEFT JOIN message_reads r ON r.message_id = m.id
             WHERE m.{} = ? ORDER BY m.created_at DESC, m.rowid DESC",
            MESSAGE_COLUMNS, column
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user], stored_message_from_row)
            .map_err(|e| Error::Storage(format!("Failed to query messages: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(|e| Error::Storage(format!("Failed to read message: {}", e)))?);
        }
        Ok(messages)
    }
}

fn stored_message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let encryption_type: String = row.get(3)?;
    let encryption_type = encryption_type
        .parse::<EncryptionType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(StoredMessage {
        message: EncryptedMessage {
            id: row.get(0)?,
            sender: row.get(1)?,
            recipient: row.get(2)?,
            encryption_type,
            ciphertext: row.get(4)?,
            iv: row.get(5)?,
            wrapped_key: row.get(6)?,
            signature: row.get(7)?,
            key_size: row.get(8)?,
            created_at: row.get(9)?,
        },
        is_read: row.get(10)?,
    })
}

// ============================================================================
// MESSAGE OPERATIONS
// ============================================================================

impl MessageStore for Database {
    fn put_message(&self, message: &EncryptedMessage) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, sender, recipient, encryption_type, ciphertext, iv,
                                   wrapped_key, signature, key_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id,
                message.sender,
                message.recipient,
                message.encryption_type.as_str(),
                message.ciphertext,
                message.iv,
                message.wrapped_key,
                message.signature,
                message.key_size,
                message.created_at,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to store message: {}", e)))?;
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<StoredMessage>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM messages m LEFT JOIN message_reads r ON r.message_id = m.id
             WHERE m.id = ?",
            MESSAGE_COLUMNS
        );
        conn.query_row(&sql, params![id], stored_message_from_row)
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get message: {}", e)))
    }

    fn messages_for_recipient(&self, user: &str) -> Result<Vec<StoredMessage>> {
        self.list_where("recipient", user)
    }

    fn messages_from_sender(&self, user: &str) -> Result<Vec<StoredMessage>> {
        self.list_where("sender", user)
    }

    fn mark_read(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?)", params![id], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Storage(format!("Failed to look up message: {}", e)))?;
        if !exists {
            return Err(Error::MessageNotFound);
        }

        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO message_reads (message_id, read_at) VALUES (?, ?)",
                params![id, crate::time::now_timestamp_millis()],
            )
            .map_err(|e| Error::Storage(format!("Failed to mark read: {}", e)))?;
        Ok(rows > 0)
    }
}

// ============================================================================
// KEY OPERATIONS
// ============================================================================

impl KeyStore for Database {
    fn put_key_pair(&self, user: &str, pair: &KeyPair) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO user_keys (username, public_key, private_key, key_size, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    user,
                    pair.public_key,
                    pair.private_key.expose(),
                    pair.key_size.bits(),
                    crate::time::now_timestamp_millis(),
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to store key pair: {}", e)))?;
        Ok(rows > 0)
    }

    fn public_key(&self, user: &str) -> Result<Option<StoredPublicKey>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT public_key, key_size FROM user_keys WHERE username = ?",
            params![user],
            |row| {
                let bits: u32 = row.get(1)?;
                let key_size = RsaKeySize::try_from(bits).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e))
                })?;
                Ok(StoredPublicKey {
                    public_key: row.get(0)?,
                    key_size,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get public key: {}", e)))
    }

    fn private_key(&self, user: &str) -> Result<Option<SecretPem>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT private_key FROM user_keys WHERE username = ?",
            params![user],
            |row| row.get::<_, String>(0).map(SecretPem::new),
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get private key: {}", e)))
    }
}
