//! Keyfile Store Module
//!
//! The server answers requests out of a [`KeyFileStore`]. The protocol does
//! not care how keyfiles are kept; two stores ship with the crate:
//!
//! - [`MemoryStore`]: a plain map, lost on exit
//! - [`FileStore`]: a map persisted as a checksummed snapshot after every
//!   mutation

mod memory;
mod file;

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use memory::MemoryStore;
pub use file::{FileStore, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a keyfile store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No keyfile is stored under the key
    #[error("Key not found: {}", String::from_utf8_lossy(.0))]
    KeyNotFound(Vec<u8>),

    /// The destination key of a rename is already taken
    #[error("Key already exists: {}", String::from_utf8_lossy(.0))]
    KeyExists(Vec<u8>),

    /// The backing medium failed
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Persisted keyfiles could not be read back
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Storage for keyfiles addressed by key
pub trait KeyFileStore {
    fn exists(&self, key: &[u8]) -> bool;

    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>>;

    /// Insert or overwrite
    fn set(&mut self, key: &[u8], keyfile: &[u8]) -> StoreResult<()>;

    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Move the keyfile under `old_key` to `new_key` in one step, replacing
    /// its contents with `keyfile` when given.
    ///
    /// Fails with `KeyExists` if `new_key` is taken, then `KeyNotFound` if
    /// `old_key` is missing. On any failure the store is unchanged.
    fn rename(&mut self, old_key: &[u8], new_key: &[u8], keyfile: Option<&[u8]>) -> StoreResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A store shared by every connection of a server
pub type SharedStore = Arc<RwLock<dyn KeyFileStore + Send + Sync>>;

/// Wrap a store for sharing across connections
pub fn shared<S>(store: S) -> SharedStore
where
    S: KeyFileStore + Send + Sync + 'static,
{
    Arc::new(RwLock::new(store))
}
