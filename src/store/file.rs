//! File-backed keyfile store
//!
//! ## Snapshot Format
//! ```text
//! ┌───────────┬─────────────┬─────────┬─────────┬──────────────────────┐
//! │ Magic (4) │ Version (2) │ CRC (4) │ Len (4) │ bincode(Snapshot)    │
//! └───────────┴─────────────┴─────────┴─────────┴──────────────────────┘
//! ```
//!
//! The whole map is rewritten after each mutation: first to `<path>.tmp`,
//! then renamed over `<path>`, so a crash leaves either the old or the new
//! snapshot on disk.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KeywardError, Result};
use super::{KeyFileStore, StoreError, StoreResult};

/// Snapshot file magic
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"KWKF";

/// Snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

/// magic + version + crc + len
pub const SNAPSHOT_HEADER_SIZE: usize = 4 + 2 + 4 + 4;

/// Body of a snapshot file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Snapshot {
    /// Keyfiles by key, ordered so equal maps produce identical files
    files: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Store that persists every change to a snapshot file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    snapshot: Snapshot,
}

impl FileStore {
    /// Open the snapshot at `path`, creating an empty store if it is missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let snapshot = if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot = decode_snapshot(&bytes)?;
            tracing::debug!("Loaded {} keyfiles from {}", snapshot.files.len(), path.display());
            snapshot
        } else {
            tracing::debug!("No snapshot at {}, starting empty", path.display());
            Snapshot::default()
        };

        Ok(Self { path, snapshot })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let bytes = encode_snapshot(&self.snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| KeywardError::Io(e.into_error()))?
            .sync_all()?;

        fs::rename(&tmp, &self.path)?;
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // Directory fsync is not supported everywhere
            let _ = File::open(dir).and_then(|d| d.sync_all());
        }
        Ok(())
    }

    /// Apply a mutation and persist it, rolling back the map if persisting fails
    fn mutate<F>(&mut self, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>),
    {
        let before = self.snapshot.clone();
        apply(&mut self.snapshot.files);
        if let Err(e) = self.persist() {
            tracing::warn!("Failed to persist {}: {}", self.path.display(), e);
            self.snapshot = before;
            return Err(StoreError::Backend(e.to_string()));
        }
        Ok(())
    }
}

impl KeyFileStore for FileStore {
    fn exists(&self, key: &[u8]) -> bool {
        self.snapshot.files.contains_key(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.snapshot
            .files
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_vec()))
    }

    fn set(&mut self, key: &[u8], keyfile: &[u8]) -> StoreResult<()> {
        let (key, keyfile) = (key.to_vec(), keyfile.to_vec());
        self.mutate(move |files| {
            files.insert(key, keyfile);
        })
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        if !self.exists(key) {
            return Err(StoreError::KeyNotFound(key.to_vec()));
        }
        self.mutate(|files| {
            files.remove(key);
        })
    }

    fn rename(&mut self, old_key: &[u8], new_key: &[u8], keyfile: Option<&[u8]>) -> StoreResult<()> {
        if self.exists(new_key) {
            return Err(StoreError::KeyExists(new_key.to_vec()));
        }
        let moved = match keyfile {
            Some(keyfile) => {
                if !self.exists(old_key) {
                    return Err(StoreError::KeyNotFound(old_key.to_vec()));
                }
                keyfile.to_vec()
            }
            None => self.get(old_key)?,
        };
        // One snapshot write covers both halves of the move
        self.mutate(|files| {
            files.remove(old_key);
            files.insert(new_key.to_vec(), moved);
        })
    }

    fn len(&self) -> usize {
        self.snapshot.files.len()
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> StoreResult<Vec<u8>> {
    let data = bincode::serialize(snapshot).map_err(|e| StoreError::Backend(e.to_string()))?;
    let len = u32::try_from(data.len())
        .map_err(|_| StoreError::Backend(format!("snapshot too large: {} bytes", data.len())))?;

    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + data.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    Ok(out)
}

fn decode_snapshot(bytes: &[u8]) -> StoreResult<Snapshot> {
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "incomplete header: expected {} bytes, got {}",
            SNAPSHOT_HEADER_SIZE,
            bytes.len()
        )));
    }

    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(StoreError::Corrupt("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported version {} (expected {})",
            version, SNAPSHOT_VERSION
        )));
    }

    let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;

    let data = &bytes[SNAPSHOT_HEADER_SIZE..];
    if data.len() != len {
        return Err(StoreError::Corrupt(format!(
            "length mismatch: header says {}, file has {}",
            len,
            data.len()
        )));
    }

    let actual = crc32fast::hash(data);
    if actual != crc {
        return Err(StoreError::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }

    bincode::deserialize(data).map_err(|e| StoreError::Corrupt(e.to_string()))
}
