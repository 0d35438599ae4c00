use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use axum::body::{to_bytes, Body};
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::SchedulingConfig;
use crate::store::{MemoryStore, PersistedState, StateStore, StoreError};
use crate::workflows::dispatch::testing::{recording_channels, Channels};
use crate::workflows::sessions::{
    AttachJury, JuryInvitation, NewSession, SessionDetail, SessionId, SessionService,
};

pub(super) fn config() -> SchedulingConfig {
    SchedulingConfig {
        timezone: Tz::UTC,
        public_base_url: "https://academy.example".to_string(),
        ..SchedulingConfig::default()
    }
}

pub(super) fn at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, day, 9, 0, 0).unwrap()
}

pub(super) struct Fixture {
    pub(super) store: Arc<MemoryStore>,
    pub(super) channels: Channels,
    pub(super) service: Arc<SessionService<MemoryStore>>,
}

impl Fixture {
    pub(super) fn new() -> Self {
        Self::with_state(PersistedState::default())
    }

    pub(super) fn with_state(state: PersistedState) -> Self {
        let store = Arc::new(MemoryStore::new(state));
        let channels = recording_channels();
        let service = Arc::new(SessionService::new(
            store.clone(),
            channels.notifier.clone(),
            config(),
        ));
        Self {
            store,
            channels,
            service,
        }
    }

    pub(super) fn aps_session(&self) -> SessionDetail {
        self.service
            .create_session(
                NewSession {
                    name: "APS March".to_string(),
                    formation: "aps".to_string(),
                    start_date: Some("2025-03-01".to_string()),
                    exam_date: Some("2025-03-20".to_string()),
                },
                at(2, 1),
            )
            .expect("session created")
    }

    pub(super) fn attach(&self, session: &SessionId, name: &str, email: Option<&str>) -> String {
        self.service
            .attach_jury(
                session,
                AttachJury {
                    name: name.to_string(),
                    email: email.map(str::to_string),
                    phone: None,
                },
            )
            .expect("jury attached")
            .id
            .0
    }

    pub(super) fn jury(&self, session: &SessionId, jury: &str) -> JuryInvitation {
        self.store
            .snapshot()
            .unwrap()
            .session(session)
            .and_then(|session| {
                session
                    .jurys
                    .iter()
                    .find(|candidate| candidate.id.0 == jury)
            })
            .cloned()
            .expect("jury present")
    }
}

/// Store whose every call fails, for error-path coverage.
pub(super) struct UnavailableStore;

impl StateStore for UnavailableStore {
    fn snapshot(&self) -> Result<PersistedState, StoreError> {
        Err(StoreError::Unavailable("disk detached".to_string()))
    }

    fn transact<T, E, F>(&self, _apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut PersistedState) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(StoreError::Unavailable("disk detached".to_string()).into())
    }
}

/// In-memory store that remembers which threads called it.
pub(super) struct ThreadTrackingStore {
    inner: MemoryStore,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadTrackingStore {
    pub(super) fn new() -> Self {
        Self {
            inner: MemoryStore::new(PersistedState::default()),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    fn track(&self) {
        self.threads.lock().unwrap().push(thread::current().id());
    }
}

impl StateStore for ThreadTrackingStore {
    fn snapshot(&self) -> Result<PersistedState, StoreError> {
        self.track();
        self.inner.snapshot()
    }

    fn transact<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut PersistedState) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.track();
        self.inner.transact(apply)
    }
}

pub(super) async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub(super) async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

pub(super) fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}
