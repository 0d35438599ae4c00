use std::sync::Mutex;

use super::{PersistedState, StateStore, StoreError};

/// Process-local store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
}

impl MemoryStore {
    pub fn new(mut state: PersistedState) -> Self {
        state.normalize();
        Self {
            state: Mutex::new(state),
        }
    }
}

impl StateStore for MemoryStore {
    fn snapshot(&self) -> Result<PersistedState, StoreError> {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))
    }

    fn transact<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut PersistedState) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))?;
        let mut working = guard.clone();
        let value = apply(&mut working)?;
        *guard = working;
        Ok(value)
    }
}
