use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::channel::Notifier;
use super::follow_up::ProspectFollowUp;
use super::job::{run_job, JobReport};
use super::jury::{JuryDispatch, JuryMessage};
use crate::config::SchedulingConfig;
use crate::dates;
use crate::store::StateStore;

/// Summary of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickDigest {
    pub ran_at: DateTime<Utc>,
    pub today: NaiveDate,
    pub reminders: JobReport,
    pub follow_ups: JobReport,
}

impl TickDigest {
    pub fn sent(&self) -> usize {
        self.reminders.sent() + self.follow_ups.sent()
    }

    pub fn failed(&self) -> usize {
        self.reminders.failed() + self.follow_ups.failed()
    }
}

impl fmt::Display for TickDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "dispatch tick for {} (ran at {})",
            self.today,
            self.ran_at.to_rfc3339()
        )?;
        write!(f, "{}{}", self.reminders, self.follow_ups)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickDigest),
    /// Another tick held the guard.
    Skipped,
    /// The state could not be loaded. Nothing was sent.
    Failed(String),
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(digest) => write!(f, "{digest}"),
            Self::Skipped => writeln!(f, "dispatch tick skipped: another tick is running"),
            Self::Failed(reason) => writeln!(f, "dispatch tick failed: {reason}"),
        }
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs every scheduled dispatch job over the persisted state.
pub struct DispatchEngine<S> {
    store: Arc<S>,
    notifier: Arc<Notifier>,
    config: SchedulingConfig,
    running: AtomicBool,
}

impl<S> DispatchEngine<S>
where
    S: StateStore + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<Notifier>, config: SchedulingConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// One synchronous pass. Overlapping calls return [`TickOutcome::Skipped`].
    pub fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("dispatch tick already running, skipping");
            return TickOutcome::Skipped;
        }
        let _guard = TickGuard(&self.running);

        let state = match self.store.snapshot() {
            Ok(state) => state,
            Err(error) => {
                tracing::error!(error = %error, "dispatch tick could not load state");
                return TickOutcome::Failed(error.to_string());
            }
        };
        let today = dates::local_today(now, self.config.timezone);

        let reminders = JuryDispatch::new(
            self.store.clone(),
            self.notifier.clone(),
            &self.config,
            JuryMessage::Reminder,
        );
        let follow_ups = ProspectFollowUp::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.follow_up,
        );

        let digest = TickDigest {
            ran_at: now,
            today,
            reminders: run_job(&reminders, &state, today, now),
            follow_ups: run_job(&follow_ups, &state, today, now),
        };
        tracing::info!(
            %today,
            sent = digest.sent(),
            failed = digest.failed(),
            "dispatch tick completed"
        );
        TickOutcome::Completed(digest)
    }
}

/// Background loop calling [`DispatchEngine::tick`] every `period`.
///
/// The first tick fires immediately. Each tick runs on the blocking pool since
/// sends and file writes are synchronous.
pub fn spawn_scheduler<S>(engine: Arc<DispatchEngine<S>>, period: Duration) -> JoinHandle<()>
where
    S: StateStore + 'static,
{
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs(), "dispatch scheduler started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let engine = engine.clone();
            match tokio::task::spawn_blocking(move || engine.tick(Utc::now())).await {
                Ok(TickOutcome::Completed(digest)) => {
                    tracing::info!(digest = %digest, "scheduled tick digest");
                }
                Ok(_) => {}
                Err(error) => tracing::error!(error = %error, "dispatch tick aborted"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PersistedState};
    use chrono::TimeZone;

    #[test]
    fn concurrent_tick_is_skipped() {
        let engine = DispatchEngine::new(
            Arc::new(MemoryStore::new(PersistedState::default())),
            Arc::new(Notifier::log_only()),
            SchedulingConfig::default(),
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();

        engine.running.store(true, Ordering::Release);
        assert_eq!(engine.tick(now), TickOutcome::Skipped);

        engine.running.store(false, Ordering::Release);
        assert!(matches!(engine.tick(now), TickOutcome::Completed(_)));
        assert!(!engine.running.load(Ordering::Acquire), "guard released");
    }

    #[test]
    fn today_follows_business_timezone() {
        let config = SchedulingConfig::default();
        let engine = DispatchEngine::new(
            Arc::new(MemoryStore::default()),
            Arc::new(Notifier::log_only()),
            config,
        );
        let late_evening_utc = Utc.with_ymd_and_hms(2025, 3, 14, 23, 30, 0).unwrap();
        let TickOutcome::Completed(digest) = engine.tick(late_evening_utc) else {
            panic!("tick should complete");
        };
        assert_eq!(digest.today, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        assert!(digest.to_string().starts_with("dispatch tick for 2025-03-15"));
    }
}
