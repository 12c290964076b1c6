//! Persistent state store
//!
//! Key-addressed durable storage used for registration state, lock state
//! and the history ring. Addressing is block + element, matching the
//! platform's NV-RAM layout. Writes are staged and only become durable at
//! `commit()`; a crash before commit loses staged writes cleanly.
//!
//! Records are framed as `[crc32 u32 LE][len u32 LE][bincode payload]`.
//! A checksum miss on read is a fatal `CorruptRecord`, never silent data.

use crate::error::AftError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Well-known block numbers for the core's persisted state.
pub mod blocks {
    pub const REGISTRATION: u32 = 1;
    pub const LOCK: u32 = 2;
    pub const HISTORY_META: u32 = 3;
    pub const HISTORY: u32 = 4;
    pub const REDEMPTION: u32 = 5;
    pub const METERS: u32 = 6;
}

/// Key-addressed transactional store.
///
/// `set` stages; `commit` makes every staged write durable as one unit.
/// `get` observes staged writes (read-your-writes within a poll cycle).
pub trait StateStore {
    fn get(&self, block: u32, element: u32) -> Result<Option<Vec<u8>>, AftError>;
    fn set(&mut self, block: u32, element: u32, bytes: Vec<u8>) -> Result<(), AftError>;
    fn remove(&mut self, block: u32, element: u32) -> Result<(), AftError>;
    /// Durable point. Must complete (or fully roll back) before returning.
    fn commit(&mut self) -> Result<(), AftError>;
}

/// Read and decode one record.
pub fn read_record<T, S>(store: &S, block: u32, element: u32) -> Result<Option<T>, AftError>
where
    T: DeserializeOwned,
    S: StateStore + ?Sized,
{
    match store.get(block, element)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and stage one record.
pub fn write_record<T, S>(
    store: &mut S,
    block: u32,
    element: u32,
    value: &T,
) -> Result<(), AftError>
where
    T: Serialize,
    S: StateStore + ?Sized,
{
    let bytes = bincode::serialize(value)?;
    store.set(block, element, bytes)
}

// ============================================================
// MEMORY STORE
// ============================================================

/// In-memory store for tests and for hosts that bring their own NV-RAM
/// driver behind the same trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: HashMap<(u32, u32), Vec<u8>>,
    staged: HashMap<(u32, u32), Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard staged writes, simulating power loss before commit.
    pub fn drop_staged(&mut self) {
        self.staged.clear();
    }
}

impl StateStore for MemoryStore {
    fn get(&self, block: u32, element: u32) -> Result<Option<Vec<u8>>, AftError> {
        if let Some(staged) = self.staged.get(&(block, element)) {
            return Ok(staged.clone());
        }
        Ok(self.committed.get(&(block, element)).cloned())
    }

    fn set(&mut self, block: u32, element: u32, bytes: Vec<u8>) -> Result<(), AftError> {
        self.staged.insert((block, element), Some(bytes));
        Ok(())
    }

    fn remove(&mut self, block: u32, element: u32) -> Result<(), AftError> {
        self.staged.insert((block, element), None);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AftError> {
        for ((block, element), value) in self.staged.drain() {
            match value {
                Some(bytes) => {
                    self.committed.insert((block, element), bytes);
                }
                None => {
                    self.committed.remove(&(block, element));
                }
            }
        }
        Ok(())
    }
}

// ============================================================
// FILE STORE
// ============================================================

/// File-backed store: one checksummed record file per (block, element).
///
/// Commit writes each dirty record to a temp file, fsyncs, then renames
/// over the old record so a crash mid-commit leaves either the old or the
/// new record intact, never a torn one.
pub struct FileStore {
    dir: PathBuf,
    staged: HashMap<(u32, u32), Option<Vec<u8>>>,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AftError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            staged: HashMap::new(),
        })
    }

    fn record_path(&self, block: u32, element: u32) -> PathBuf {
        self.dir.join(format!("{:04}_{:06}.rec", block, element))
    }

    fn frame(bytes: &[u8]) -> Vec<u8> {
        let crc = crc32fast::hash(bytes);
        let mut framed = Vec::with_capacity(8 + bytes.len());
        framed.extend_from_slice(&crc.to_le_bytes());
        framed.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        framed.extend_from_slice(bytes);
        framed
    }

    fn unframe(framed: &[u8], block: u32, element: u32) -> Result<Vec<u8>, AftError> {
        if framed.len() < 8 {
            return Err(AftError::CorruptRecord { block, element });
        }
        let crc = u32::from_le_bytes([framed[0], framed[1], framed[2], framed[3]]);
        let len = u32::from_le_bytes([framed[4], framed[5], framed[6], framed[7]]) as usize;
        let payload = &framed[8..];
        if payload.len() != len || crc32fast::hash(payload) != crc {
            return Err(AftError::CorruptRecord { block, element });
        }
        Ok(payload.to_vec())
    }
}

impl StateStore for FileStore {
    fn get(&self, block: u32, element: u32) -> Result<Option<Vec<u8>>, AftError> {
        if let Some(staged) = self.staged.get(&(block, element)) {
            return Ok(staged.clone());
        }
        let path = self.record_path(block, element);
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut framed = Vec::new();
        file.read_to_end(&mut framed)?;
        Self::unframe(&framed, block, element).map(Some)
    }

    fn set(&mut self, block: u32, element: u32, bytes: Vec<u8>) -> Result<(), AftError> {
        self.staged.insert((block, element), Some(bytes));
        Ok(())
    }

    fn remove(&mut self, block: u32, element: u32) -> Result<(), AftError> {
        self.staged.insert((block, element), None);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AftError> {
        let staged: Vec<_> = self.staged.drain().collect();
        for ((block, element), value) in staged {
            let path = self.record_path(block, element);
            match value {
                Some(bytes) => {
                    let tmp = path.with_extension("tmp");
                    let mut file = fs::File::create(&tmp)?;
                    file.write_all(&Self::frame(&bytes))?;
                    file.sync_all()?;
                    fs::rename(&tmp, &path)?;
                }
                None => match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================
