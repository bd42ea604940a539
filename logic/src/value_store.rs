use std::collections::HashMap;

use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::consts::ID_LEN;
use crate::id::Id;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no value stored under this key")]
pub struct KeyNotFound;

/// Content-addressed store for the `store`/`find_value` commands. No
/// ownership, replication or expiry: a value's key is derived from its own
/// bytes, not supplied by the caller.
pub trait ValueStore {
    fn store(&mut self, value: Vec<u8>) -> Id;
    fn retrieve(&self, key: Id) -> Result<Vec<u8>, KeyNotFound>;
}

/// Derive the content key for a stored value: SHA-512 over the bytes,
/// truncated to [`ID_LEN`], the same construction [`crate::id::Id::generate_self`]
/// uses for the self-key.
pub fn content_key(value: &[u8]) -> Id {
    let digest = Sha512::digest(value);
    let mut bytes = [0u8; ID_LEN];
    bytes.copy_from_slice(&digest[..ID_LEN]);
    Id(bytes)
}

#[derive(Debug, Default)]
pub struct MemoryValueStore {
    values: HashMap<Id, Vec<u8>>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueStore for MemoryValueStore {
    fn store(&mut self, value: Vec<u8>) -> Id {
        let key = content_key(&value);
        tracing::info!(%key, len = value.len(), "storing value");
        self.values.insert(key, value);
        key
    }

    fn retrieve(&self, key: Id) -> Result<Vec<u8>, KeyNotFound> {
        self.values.get(&key).cloned().ok_or(KeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_retrieve() {
        let mut store = MemoryValueStore::new();
        let key = store.store(b"hello".to_vec());
        assert_eq!(store.retrieve(key).unwrap(), b"hello");
    }

    #[test]
    fn missing_key_errors() {
        let store = MemoryValueStore::new();
        assert_eq!(store.retrieve(Id::ZERO).unwrap_err(), KeyNotFound);
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(content_key(b"same"), content_key(b"same"));
        assert_ne!(content_key(b"same"), content_key(b"different"));
    }
}
