//! Durability scenarios for the JSON state file shared by the API and the scheduler.

use std::sync::Arc;
use std::thread;

use academy_ops::store::{JsonFileStore, PersistedState, StateStore, StoreError};
use academy_ops::workflows::prospects::{Prospect, ProspectId};
use academy_ops::workflows::sessions::{JuryStatus, SessionId};

fn prospect(id: String) -> Prospect {
    Prospect {
        id: ProspectId(id),
        formation: "aps".to_string(),
        name: "Concurrent".to_string(),
        ..Prospect::default()
    }
}

#[test]
fn concurrent_writers_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                for n in 0..10 {
                    store
                        .transact(|state| {
                            state.prospects.push(prospect(format!("w{worker}-{n}")));
                            Ok::<_, StoreError>(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reopened = JsonFileStore::open(dir.path().join("state.json")).unwrap();
    let state = reopened.snapshot().unwrap();
    assert_eq!(state.prospects.len(), 80);
    assert!(state
        .prospect(&ProspectId("w7-9".to_string()))
        .is_some());
}

#[test]
fn sparse_legacy_document_loads_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{
            "sessions": [
                {
                    "id": "s-1",
                    "name": "APS legacy",
                    "formation": "aps",
                    "examDate": "2025-03-20",
                    "jurys": [{ "id": "j-1", "name": "Claire" }]
                }
            ],
            "prospects": [
                { "id": "p-1", "formation": "aps", "name": "Léa", "cpf": "1200,50" }
            ]
        }"#,
    )
    .unwrap();

    let store = JsonFileStore::open(&path).unwrap();
    let state = store.snapshot().unwrap();
    let session = state.session(&SessionId("s-1".to_string())).unwrap();
    assert!(session.start_date.is_none());
    assert_eq!(session.exam_date.as_deref(), Some("2025-03-20"));
    assert!(session.steps.is_empty());
    assert!(!session.archived);
    let jury = &session.jurys[0];
    assert_eq!(jury.status, JuryStatus::Pending);
    assert!(jury.token.is_none());

    let prospect = state.prospect(&ProspectId("p-1".to_string())).unwrap();
    assert!(!prospect.sent);
    assert!((prospect.cpf - 1200.5).abs() < f64::EPSILON);
}

#[test]
fn saved_document_keeps_the_top_level_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let store = JsonFileStore::open(&path).unwrap();
    store
        .transact(|state: &mut PersistedState| {
            state.prospects.push(prospect("p-1".to_string()));
            Ok::<_, StoreError>(())
        })
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["sessions"].as_array().is_some_and(Vec::is_empty));
    assert_eq!(raw["prospects"][0]["id"], "p-1");
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != "state.json" && entry.file_name() != "state.json.lock")
        .collect();
    assert!(leftovers.is_empty(), "temporary files cleaned up");
}
