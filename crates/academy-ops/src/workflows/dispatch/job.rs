//! The trigger-date, idempotent-send and result-recording contract shared by
//! every scheduled notification flow.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use super::channel::DeliveryReport;
use crate::store::{PersistedState, StoreError};
use crate::workflows::sessions::InvitationError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error("follow-up already sent")]
    AlreadySent,
    #[error("{0} has no usable trigger date")]
    NoTriggerDate(String),
    #[error("unknown formation '{0}'")]
    UnknownFormation(String),
    #[error("{0} are not scheduled automatically")]
    NotScheduled(&'static str),
}

impl DispatchError {
    /// Guard refusals mean "nothing to do" rather than a delivery problem.
    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Invitation(_) | Self::AlreadySent)
    }
}

/// A scheduled notification flow.
///
/// `attempt_send` claims the target inside a store transaction (re-checking its
/// guard and stamping the attempt) and only then talks to the channels, outside
/// of any lock. `record_outcome` applies the result in a second transaction.
pub trait DispatchJob {
    type Target: Clone + fmt::Display;

    fn name(&self) -> &'static str;

    fn targets(&self, state: &PersistedState) -> Vec<Self::Target>;

    fn compute_trigger_date(
        &self,
        state: &PersistedState,
        target: &Self::Target,
    ) -> Result<NaiveDate, DispatchError>;

    fn is_due(&self, trigger: NaiveDate, today: NaiveDate) -> bool;

    fn already_dispatched(
        &self,
        state: &PersistedState,
        target: &Self::Target,
    ) -> Result<bool, DispatchError>;

    fn attempt_send(
        &self,
        target: &Self::Target,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport, DispatchError>;

    fn record_outcome(
        &self,
        target: &Self::Target,
        report: &DeliveryReport,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError>;

    /// Best-effort bookkeeping for an error raised before any send happened.
    fn record_error(&self, target: &Self::Target, error: &DispatchError, now: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Sent(DeliveryReport),
    Failed(String),
    Skipped(String),
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent(report) => write!(f, "sent ({report})"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub target: String,
    pub outcome: TargetOutcome,
}

impl fmt::Display for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.outcome)
    }
}

/// Sends to one target regardless of its trigger date, then records the result.
pub fn dispatch_target<J: DispatchJob>(
    job: &J,
    target: &J::Target,
    now: DateTime<Utc>,
) -> TargetOutcome {
    let report = match job.attempt_send(target, now) {
        Ok(report) => report,
        Err(error) if error.is_guard() => return TargetOutcome::Skipped(error.to_string()),
        Err(error) => {
            tracing::warn!(job = job.name(), target = %target, error = %error, "dispatch attempt failed");
            job.record_error(target, &error, now);
            return TargetOutcome::Failed(error.to_string());
        }
    };

    if let Err(error) = job.record_outcome(target, &report, now) {
        tracing::error!(
            job = job.name(),
            target = %target,
            error = %error,
            "delivery outcome could not be recorded"
        );
        return TargetOutcome::Failed(format!("outcome not recorded: {error}"));
    }

    if report.any_success() {
        tracing::info!(job = job.name(), target = %target, delivery = %report, "dispatched");
        TargetOutcome::Sent(report)
    } else {
        let reason = report
            .error_summary()
            .unwrap_or_else(|| "nothing delivered".to_string());
        tracing::warn!(job = job.name(), target = %target, reason = %reason, "delivery failed");
        TargetOutcome::Failed(reason)
    }
}

/// Outcome of one job over one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: &'static str,
    pub entries: Vec<JobEntry>,
    /// Targets evaluated but not due, including those without a usable date.
    pub waiting: usize,
}

impl JobReport {
    pub fn sent(&self) -> usize {
        self.count(|outcome| matches!(outcome, TargetOutcome::Sent(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TargetOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TargetOutcome::Skipped(_)))
    }

    fn count(&self, predicate: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} sent, {} failed, {} skipped, {} not due",
            self.job,
            self.sent(),
            self.failed(),
            self.skipped(),
            self.waiting
        )?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

/// Evaluates every target of `job` against `today` and dispatches the due ones.
///
/// Each target is handled on its own: an error is recorded on that target and
/// the loop moves on.
pub fn run_job<J: DispatchJob>(
    job: &J,
    state: &PersistedState,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> JobReport {
    let mut report = JobReport {
        job: job.name(),
        entries: Vec::new(),
        waiting: 0,
    };

    for target in job.targets(state) {
        match job.already_dispatched(state, &target) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(error) => {
                job.record_error(&target, &error, now);
                report.entries.push(JobEntry {
                    target: target.to_string(),
                    outcome: TargetOutcome::Failed(error.to_string()),
                });
                continue;
            }
        }

        let trigger = match job.compute_trigger_date(state, &target) {
            Ok(trigger) => trigger,
            Err(DispatchError::NoTriggerDate(what)) => {
                tracing::debug!(job = job.name(), target = %target, what = %what, "no trigger date");
                report.waiting += 1;
                continue;
            }
            Err(error) => {
                tracing::warn!(job = job.name(), target = %target, error = %error, "trigger evaluation failed");
                job.record_error(&target, &error, now);
                report.entries.push(JobEntry {
                    target: target.to_string(),
                    outcome: TargetOutcome::Failed(error.to_string()),
                });
                continue;
            }
        };

        if !job.is_due(trigger, today) {
            report.waiting += 1;
            continue;
        }

        let outcome = dispatch_target(job, &target, now);
        report.entries.push(JobEntry {
            target: target.to_string(),
            outcome,
        });
    }

    report
}
