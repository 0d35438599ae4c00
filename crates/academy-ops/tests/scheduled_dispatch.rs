//! End-to-end dispatch passes over a real state file, including restarts and the
//! background scheduler.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use academy_ops::config::SchedulingConfig;
use academy_ops::store::{JsonFileStore, StateStore, StoreError};
use academy_ops::workflows::dispatch::{
    spawn_scheduler, ChannelError, ChannelKind, DispatchEngine, NotificationChannel, Notifier,
    OutboundMessage, TickOutcome,
};
use academy_ops::workflows::prospects::{Prospect, ProspectId};
use academy_ops::workflows::sessions::{
    InvitationId, JuryInvitation, RuleCatalog, Session, SessionId,
};
use chrono::{DateTime, Duration as Days, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(ChannelKind, String, String)>>,
}

struct OutboxChannel {
    kind: ChannelKind,
    outbox: Arc<Outbox>,
}

impl NotificationChannel for OutboxChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        self.outbox.sent.lock().unwrap().push((
            self.kind,
            recipient.to_string(),
            message.body.clone(),
        ));
        Ok(())
    }
}

impl Outbox {
    fn to(&self, recipient: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, to, _)| to == recipient)
            .count()
    }
}

fn notifier(outbox: &Arc<Outbox>) -> Arc<Notifier> {
    Arc::new(Notifier::new(
        Arc::new(OutboxChannel {
            kind: ChannelKind::Email,
            outbox: outbox.clone(),
        }),
        Arc::new(OutboxChannel {
            kind: ChannelKind::Sms,
            outbox: outbox.clone(),
        }),
    ))
}

fn scheduling() -> SchedulingConfig {
    SchedulingConfig {
        timezone: Tz::Europe__Paris,
        reminder_lead_days: 5,
        public_base_url: "https://academy.example".to_string(),
        ..SchedulingConfig::default()
    }
}

fn seed(store: &JsonFileStore, exam: &str, training_start: &str) {
    let mut session = Session::new(
        SessionId("s-1".to_string()),
        "APS juin".to_string(),
        "aps".to_string(),
        None,
        Some(exam.to_string()),
        &RuleCatalog::for_code("aps"),
    );
    let mut jury = JuryInvitation::new("Claire".to_string(), Some("claire@example.org".to_string()), None);
    jury.id = InvitationId("j-1".to_string());
    session.jurys.push(jury);

    let prospect = Prospect {
        id: ProspectId("p-1".to_string()),
        formation: "a3p".to_string(),
        name: "Yanis".to_string(),
        phone: Some("+33611111111".to_string()),
        cpf: 2000.0,
        training_start: Some(training_start.to_string()),
        ..Prospect::default()
    };

    store
        .transact(|state| {
            state.sessions.push(session);
            state.prospects.push(prospect);
            Ok::<_, StoreError>(())
        })
        .unwrap();
}

fn paris_morning(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 6, 0, 0).unwrap()
}

#[test]
fn nothing_is_sent_twice_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let outbox = Arc::new(Outbox::default());

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        seed(&store, "2025-06-20", "2025-07-01");
        let engine = DispatchEngine::new(store, notifier(&outbox), scheduling());
        match engine.tick(paris_morning(15)) {
            TickOutcome::Completed(digest) => {
                assert_eq!(digest.reminders.sent(), 1);
                assert_eq!(digest.follow_ups.sent(), 1);
            }
            other => panic!("tick did not complete: {other:?}"),
        }
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let engine = DispatchEngine::new(store.clone(), notifier(&outbox), scheduling());
    engine.tick(paris_morning(15) + Days::hours(2));
    engine.tick(paris_morning(16));

    assert_eq!(outbox.to("claire@example.org"), 1);
    assert_eq!(outbox.to("+33611111111"), 1);

    let state = store.snapshot().unwrap();
    let prospect = state.prospect(&ProspectId("p-1".to_string())).unwrap();
    assert!(prospect.sent);
    assert_eq!(prospect.proposed_price, Some(2240));
    assert_eq!(prospect.proposed_discount, Some(30));
    let jury = state
        .session(&SessionId("s-1".to_string()))
        .and_then(|session| session.invitation(&InvitationId("j-1".to_string())))
        .unwrap();
    assert!(jury.reminded_at.is_some());
    assert!(jury.token.as_deref().is_some_and(|token| !token.is_empty()));
}

#[test]
fn paris_calendar_decides_the_reminder_day() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = Arc::new(Outbox::default());
    let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());
    seed(&store, "2025-06-20", "2025-12-01");
    let engine = DispatchEngine::new(store, notifier(&outbox), scheduling());

    // 21:30 UTC on the 14th is already the 15th in Paris (UTC+2).
    engine.tick(Utc.with_ymd_and_hms(2025, 6, 14, 21, 30, 0).unwrap());
    assert_eq!(outbox.to("claire@example.org"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_scheduler_runs_the_first_tick_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = Arc::new(Outbox::default());
    let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());

    let paris_today = Utc::now().with_timezone(&Tz::Europe__Paris).date_naive();
    let exam = paris_today + Days::days(5);
    let start = paris_today + Days::days(10);
    seed(&store, &exam.to_string(), &start.to_string());

    let engine = Arc::new(DispatchEngine::new(store, notifier(&outbox), scheduling()));
    let handle = spawn_scheduler(engine, Duration::from_secs(3600));

    let mut delivered = false;
    for _ in 0..50 {
        if outbox.to("claire@example.org") == 1 && outbox.to("+33611111111") == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    handle.abort();
    assert!(delivered, "first scheduled tick delivered both messages");
}
