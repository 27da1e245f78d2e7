//! Durable scanner checkpoints.
//!
//! Each scanner owns one JSON document under its own state directory.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! kill mid-write leaves the previous checkpoint intact. A missing or
//! unreadable document means "start fresh".

use costscope_core::error::CoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Atomic JSON file holding one scanner's state `T`.
#[derive(Debug, Clone)]
pub struct CheckpointStore<T> {
    path: PathBuf,
    _state: PhantomData<fn() -> T>,
}

impl<T> CheckpointStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _state: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last committed state, or `T::default()` if there is none.
    pub fn load(&self) -> T {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!("cannot read checkpoint {}: {e}", self.path.display());
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!("discarding corrupt checkpoint {}: {e}", self.path.display());
                T::default()
            }
        }
    }

    /// Commit `state` atomically.
    pub fn save(&self, state: &T) -> Result<(), CoreError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "checkpoint path has no parent: {}",
                    self.path.display()
                ))
            })?;
        fs::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CoreError::Io(e.error))?;

        debug!("checkpoint committed: {}", self.path.display());
        Ok(())
    }
}
