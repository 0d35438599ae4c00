//! Persisted state and the transactional store abstraction.
//!
//! Every mutation goes through [`StateStore::transact`], which re-reads the
//! document under the store lock, applies the closure and writes the result
//! back only when the closure succeeds. Foreground handlers and the dispatch
//! engine therefore never overwrite each other's entities with a stale copy.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::workflows::prospects::{Prospect, ProspectId};
use crate::workflows::sessions::{InvitationId, Session, SessionId};

/// The whole persisted document: `{ "sessions": [...], "prospects": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub prospects: Vec<Prospect>,
}

impl PersistedState {
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| &session.id == id)
    }

    pub fn prospect(&self, id: &ProspectId) -> Option<&Prospect> {
        self.prospects.iter().find(|prospect| &prospect.id == id)
    }

    pub fn prospect_mut(&mut self, id: &ProspectId) -> Option<&mut Prospect> {
        self.prospects.iter_mut().find(|prospect| &prospect.id == id)
    }

    /// Repairs records loaded from an older or hand-edited document: assigns
    /// identifiers where they are missing and re-derives `archived`. Returns
    /// whether anything changed.
    pub(crate) fn normalize(&mut self) -> bool {
        let mut changed = false;
        for session in &mut self.sessions {
            if session.id.0.trim().is_empty() {
                session.id = SessionId::generate();
                changed = true;
            }
            for jury in &mut session.jurys {
                if jury.id.0.trim().is_empty() {
                    jury.id = InvitationId::generate();
                    changed = true;
                }
            }
            let archived = session.archived;
            session.recompute_archived();
            changed |= archived != session.archived;
        }
        for prospect in &mut self.prospects {
            if prospect.id.0.trim().is_empty() {
                prospect.id = ProspectId::generate();
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("state document is unreadable: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("unable to encode state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("state file io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction shared by the HTTP layer and the dispatch engine.
pub trait StateStore: Send + Sync {
    /// Fresh copy of the whole document.
    fn snapshot(&self) -> Result<PersistedState, StoreError>;

    /// Serialized read-modify-write. Nothing is written when `apply` fails.
    fn transact<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut PersistedState) -> Result<T, E>,
        E: From<StoreError>;

    fn update_session<T, E, F>(&self, id: &SessionId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut Session) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.transact(|state| {
            let session = state
                .session_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("session {id}")))?;
            apply(session)
        })
    }

    fn update_prospect<T, E, F>(&self, id: &ProspectId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut Prospect) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.transact(|state| {
            let prospect = state
                .prospect_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("prospect {id}")))?;
            apply(prospect)
        })
    }
}
