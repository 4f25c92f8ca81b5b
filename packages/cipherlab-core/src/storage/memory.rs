//! In-memory store.
//!
//! Backs tests and demos. Messages are kept in insertion order so that
//! messages created within the same millisecond still list newest first.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::{KeyStore, MessageStore, StoredMessage, StoredPublicKey};
use crate::crypto::{KeyPair, SecretPem};
use crate::error::{Error, Result};
use crate::messaging::EncryptedMessage;

#[derive(Default)]
struct Inner {
    messages: Vec<EncryptedMessage>,
    index: HashMap<String, usize>,
    read: HashSet<String>,
    keys: HashMap<String, KeyPair>,
}

/// Message and key storage held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn list<F>(&self, filter: F) -> Vec<StoredMessage>
    where
        F: Fn(&EncryptedMessage) -> bool,
    {
        let inner = self.inner.read();
        let mut out: Vec<StoredMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| filter(m))
            .map(|m| StoredMessage {
                message: m.clone(),
                is_read: inner.read.contains(&m.id),
            })
            .collect();
        // Stable sort keeps reverse insertion order for equal timestamps.
        out.sort_by(|a, b| b.message.created_at.cmp(&a.message.created_at));
        out
    }
}

impl MessageStore for MemoryStore {
    fn put_message(&self, message: &EncryptedMessage) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&message.id) {
            return Err(Error::Storage(format!("duplicate message id {}", message.id)));
        }
        let position = inner.messages.len();
        inner.index.insert(message.id.clone(), position);
        inner.messages.push(message.clone());
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<StoredMessage>> {
        let inner = self.inner.read();
        Ok(inner.index.get(id).map(|&i| StoredMessage {
            message: inner.messages[i].clone(),
            is_read: inner.read.contains(id),
        }))
    }

    fn messages_for_recipient(&self, user: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.list(|m| m.recipient == user))
    }

    fn messages_from_sender(&self, user: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.list(|m| m.sender == user))
    }

    fn mark_read(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        if !inner.index.contains_key(id) {
            return Err(Error::MessageNotFound);
        }
        Ok(inner.read.insert(id.to_string()))
    }
}

impl KeyStore for MemoryStore {
    fn put_key_pair(&self, user: &str, pair: &KeyPair) -> Result<bool> {
        let mut inner = self.inner.write();
        if inner.keys.contains_key(user) {
            return Ok(false);
        }
        inner.keys.insert(user.to_string(), pair.clone());
        Ok(true)
    }

    fn public_key(&self, user: &str) -> Result<Option<StoredPublicKey>> {
        Ok(self.inner.read().keys.get(user).map(|pair| StoredPublicKey {
            public_key: pair.public_key.clone(),
            key_size: pair.key_size,
        }))
    }

    fn private_key(&self, user: &str) -> Result<Option<SecretPem>> {
        Ok(self
            .inner
            .read()
            .keys
            .get(user)
            .map(|pair| pair.private_key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RsaKeySize;
    use crate::storage::tests::sample_message;

    #[test]
    fn test_listing_is_newest_first() {
        let store = MemoryStore::new();
        store.put_message(&sample_message("m1", "alice", "bob", 100)).unwrap();
        store.put_message(&sample_message("m2", "alice", "bob", 300)).unwrap();
        store.put_message(&sample_message("m3", "carol", "bob", 200)).unwrap();
        store.put_message(&sample_message("m4", "bob", "alice", 400)).unwrap();

        let inbox: Vec<String> = store
            .messages_for_recipient("bob")
            .unwrap()
            .into_iter()
            .map(|s| s.message.id)
            .collect();
        assert_eq!(inbox, vec!["m2", "m3", "m1"]);

        let sent = store.messages_from_sender("alice").unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message.id, "m2");
    }

    #[test]
    fn test_same_timestamp_keeps_insertion_recency() {
        let store = MemoryStore::new();
        store.put_message(&sample_message("first", "a", "b", 5)).unwrap();
        store.put_message(&sample_message("second", "a", "b", 5)).unwrap();

        let inbox = store.messages_for_recipient("b").unwrap();
        assert_eq!(inbox[0].message.id, "second");
    }

    #[test]
    fn test_read_state_is_separate() {
        let store = MemoryStore::new();
        let original = sample_message("m1", "alice", "bob", 1);
        store.put_message(&original).unwrap();

        assert!(store.mark_read("m1").unwrap());
        assert!(!store.mark_read("m1").unwrap());

        let stored = store.get_message("m1").unwrap().unwrap();
        assert!(stored.is_read);
        assert_eq!(stored.message, original);
        assert!(matches!(store.mark_read("nope"), Err(Error::MessageNotFound)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        store.put_message(&sample_message("m1", "a", "b", 1)).unwrap();
        assert!(matches!(
            store.put_message(&sample_message("m1", "a", "b", 2)),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_key_pairs_are_write_once() {
        let store = MemoryStore::new();
        let first = KeyPair {
            public_key: "pub-1".into(),
            private_key: SecretPem::new("priv-1"),
            key_size: RsaKeySize::Rsa2048,
        };
        let second = KeyPair {
            public_key: "pub-2".into(),
            private_key: SecretPem::new("priv-2"),
            key_size: RsaKeySize::Rsa4096,
        };

        assert!(store.put_key_pair("alice", &first).unwrap());
        assert!(!store.put_key_pair("alice", &second).unwrap());

        let public = store.public_key("alice").unwrap().unwrap();
        assert_eq!(public.public_key, "pub-1");
        assert_eq!(public.key_size, RsaKeySize::Rsa2048);
        assert_eq!(store.private_key("alice").unwrap().unwrap().expose(), "priv-1");
        assert!(store.public_key("nobody").unwrap().is_none());
    }
}
