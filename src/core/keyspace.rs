// src/core/keyspace.rs

//! The concurrent map of key -> (value, expiry) that commands act on.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;

/// `None` means no expiry (infinite lifetime).
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    pub expires_at_ms: Option<i64>,
}

/// Milliseconds since the Unix epoch, per spec.md's absolute-deadline model.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

#[derive(Debug, Default)]
pub struct Keyspace {
    entries: DashMap<Bytes, Entry>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value if present and not expired. An expired entry is
    /// purged as a side effect of this read, per spec.md's lazy-expiry rule.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = now_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => matches!(entry.expires_at_ms, Some(deadline) if now > deadline),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: Bytes, value: Bytes, expires_at_ms: Option<i64>) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at_ms,
            },
        );
    }

    pub fn pop(&self, key: &[u8]) -> Option<Entry> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
