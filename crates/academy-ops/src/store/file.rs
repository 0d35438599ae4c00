use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use tempfile::NamedTempFile;

use super::{PersistedState, StateStore, StoreError};

/// JSON document on disk, replaced atomically on every write.
///
/// The new content goes to a temporary file in the same directory, is synced,
/// then renamed over the previous document, so a crash mid-write leaves the
/// last consistent version in place.
///
/// Every read and read-modify-write holds an advisory lock on a sibling
/// `<name>.lock` file, which serializes other processes opening the same path.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

/// Held for the duration of one store operation.
struct StateLock<'a> {
    file: File,
    _local: MutexGuard<'a, ()>,
}

impl Drop for StateLock<'_> {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %err, "failed to release state file lock");
        }
    }
}

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let store = Self {
            lock_path: path.with_file_name(lock_name),
            path,
            lock: Mutex::new(()),
        };

        let _guard = store.lock(LockMode::Exclusive)?;
        let mut state = store.read()?;
        if state.normalize() {
            tracing::info!(path = %store.path.display(), "normalized persisted state");
            store.write(&state)?;
        }
        drop(_guard);

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, mode: LockMode) -> Result<StateLock<'_>, StoreError> {
        let local = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        match mode {
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
        }
        Ok(StateLock {
            file,
            _local: local,
        })
    }

    fn read(&self) -> Result<PersistedState, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedState::default());
            }
            Err(err) => return Err(err.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(PersistedState::default());
        }
        serde_json::from_slice(&raw).map_err(StoreError::Corrupt)
    }

    fn write(&self, state: &PersistedState) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut staged = NamedTempFile::new_in(&dir)?;
        staged.write_all(&encoded)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| StoreError::Io(err.error))?;

        tracing::debug!(
            path = %self.path.display(),
            sessions = state.sessions.len(),
            prospects = state.prospects.len(),
            "persisted state"
        );
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn snapshot(&self) -> Result<PersistedState, StoreError> {
        let _guard = self.lock(LockMode::Shared)?;
        self.read()
    }

    fn transact<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut PersistedState) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.lock(LockMode::Exclusive)?;
        let mut state = self.read()?;
        let value = apply(&mut state)?;
        self.write(&state)?;
        Ok(value)
    }
}
