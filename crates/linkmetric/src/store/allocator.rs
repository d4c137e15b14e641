//! Sequential customer id allocation backed by a durable counter.
//!
//! The counter is an atomic-increment-on-durable-storage primitive, not an
//! in-process integer: issued values must never repeat across restarts.

use crate::pipeline::domain::CustomerId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const CUSTOMER_ID_PREFIX: &str = "LM";

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("sequence storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sequence file is corrupt: {0}")]
    Corrupt(String),
}

/// A monotonically increasing counter. `next_value` is linearizable: two
/// concurrent callers never observe the same value.
pub trait Sequence: Send + Sync {
    fn next_value(&self) -> Result<u64, SequenceError>;
    fn current(&self) -> Result<u64, SequenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SequenceFileBody {
    counter: u64,
    updated_at: String,
}

/// Durable counter persisted as a small JSON file. Writes go to a temp file
/// first and are renamed into place, so a crash mid-write leaves the last
/// committed value intact. The mutex serializes read-increment-write.
#[derive(Debug)]
pub struct FileSequence {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileSequence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read_counter(path: &Path) -> Result<u64, SequenceError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let body: SequenceFileBody = serde_json::from_str(&raw)
                    .map_err(|err| SequenceError::Corrupt(err.to_string()))?;
                Ok(body.counter)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write_counter(path: &Path, counter: u64) -> Result<(), SequenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = SequenceFileBody {
            counter,
            updated_at: Utc::now().to_rfc3339(),
        };
        let serialized = serde_json::to_string_pretty(&body)
            .map_err(|err| SequenceError::Corrupt(err.to_string()))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Sequence for FileSequence {
    fn next_value(&self) -> Result<u64, SequenceError> {
        let _lock = self.guard.lock().expect("sequence mutex poisoned");
        let next = Self::read_counter(&self.path)? + 1;
        Self::write_counter(&self.path, next)?;
        Ok(next)
    }

    fn current(&self) -> Result<u64, SequenceError> {
        let _lock = self.guard.lock().expect("sequence mutex poisoned");
        Self::read_counter(&self.path)
    }
}

/// In-process counter for tests and demos.
#[derive(Debug, Default)]
pub struct MemorySequence {
    counter: AtomicU64,
}

impl MemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sequence for MemorySequence {
    fn next_value(&self) -> Result<u64, SequenceError> {
        Ok(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn current(&self) -> Result<u64, SequenceError> {
        Ok(self.counter.load(Ordering::Relaxed))
    }
}

/// Issues formatted customer ids (`LM-00001`) off a [`Sequence`].
#[derive(Clone)]
pub struct CustomerIdAllocator {
    sequence: std::sync::Arc<dyn Sequence>,
}

impl CustomerIdAllocator {
    pub fn new(sequence: std::sync::Arc<dyn Sequence>) -> Self {
        Self { sequence }
    }

    pub fn next_id(&self) -> Result<CustomerId, SequenceError> {
        let value = self.sequence.next_value()?;
        Ok(CustomerId(format!("{CUSTOMER_ID_PREFIX}-{value:05}")))
    }
}

impl std::fmt::Debug for CustomerIdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerIdAllocator").finish_non_exhaustive()
    }
}
