//! In-memory keyfile store

use std::collections::HashMap;

use super::{KeyFileStore, StoreError, StoreResult};

/// HashMap-backed store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(Vec<u8>, Vec<u8>)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl KeyFileStore for MemoryStore {
    fn exists(&self, key: &[u8]) -> bool {
        self.files.contains_key(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.files
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_vec()))
    }

    fn set(&mut self, key: &[u8], keyfile: &[u8]) -> StoreResult<()> {
        self.files.insert(key.to_vec(), keyfile.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.files
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_vec()))
    }

    fn rename(&mut self, old_key: &[u8], new_key: &[u8], keyfile: Option<&[u8]>) -> StoreResult<()> {
        if self.files.contains_key(new_key) {
            return Err(StoreError::KeyExists(new_key.to_vec()));
        }
        let current = self
            .files
            .remove(old_key)
            .ok_or_else(|| StoreError::KeyNotFound(old_key.to_vec()))?;
        let moved = keyfile.map_or(current, <[u8]>::to_vec);
        self.files.insert(new_key.to_vec(), moved);
        Ok(())
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}
