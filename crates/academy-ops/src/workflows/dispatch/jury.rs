use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::channel::{DeliveryReport, Notifier, OutboundMessage};
use super::job::{DispatchError, DispatchJob};
use super::messages;
use crate::config::SchedulingConfig;
use crate::store::{PersistedState, StateStore, StoreError};
use crate::workflows::sessions::domain::Anchor;
use crate::workflows::sessions::{InvitationId, JuryInvitation, SessionId};

/// Which jury message a [`JuryDispatch`] sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JuryMessage {
    /// Initial invitation. Operator triggered only, may be re-sent while pending.
    Invitation,
    /// Single reminder before the exam.
    Reminder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JuryTarget {
    pub session_id: SessionId,
    pub invitation_id: InvitationId,
}

impl fmt::Display for JuryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {} / jury {}", self.session_id, self.invitation_id)
    }
}

struct Claim {
    email: Option<String>,
    phone: Option<String>,
    message: OutboundMessage,
}

/// Invitation and reminder delivery for jury members.
pub struct JuryDispatch<S> {
    store: Arc<S>,
    notifier: Arc<Notifier>,
    base_url: String,
    lead_days: i64,
    message: JuryMessage,
}

impl<S> JuryDispatch<S>
where
    S: StateStore,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<Notifier>,
        config: &SchedulingConfig,
        message: JuryMessage,
    ) -> Self {
        Self {
            store,
            notifier,
            base_url: config.public_base_url.clone(),
            lead_days: config.reminder_lead_days,
            message,
        }
    }

    fn find<'a>(
        state: &'a PersistedState,
        target: &JuryTarget,
    ) -> Result<&'a JuryInvitation, DispatchError> {
        state
            .session(&target.session_id)
            .and_then(|session| session.invitation(&target.invitation_id))
            .ok_or_else(|| missing(target).into())
    }

    fn update<T>(
        &self,
        target: &JuryTarget,
        apply: impl FnOnce(&mut JuryInvitation) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        self.store.update_session(&target.session_id, |session| {
            let jury = session
                .invitation_mut(&target.invitation_id)
                .ok_or_else(|| missing(target))?;
            apply(jury)
        })
    }
}

fn missing(target: &JuryTarget) -> StoreError {
    StoreError::NotFound(format!("invitation {}", target.invitation_id))
}

impl<S> DispatchJob for JuryDispatch<S>
where
    S: StateStore,
{
    type Target = JuryTarget;

    fn name(&self) -> &'static str {
        match self.message {
            JuryMessage::Invitation => "jury invitations",
            JuryMessage::Reminder => "jury reminders",
        }
    }

    fn targets(&self, state: &PersistedState) -> Vec<JuryTarget> {
        state
            .sessions
            .iter()
            .flat_map(|session| {
                session
                    .jurys
                    .iter()
                    .filter(|jury| !jury.status.is_terminal())
                    .map(|jury| JuryTarget {
                        session_id: session.id.clone(),
                        invitation_id: jury.id.clone(),
                    })
            })
            .collect()
    }

    fn compute_trigger_date(
        &self,
        state: &PersistedState,
        target: &JuryTarget,
    ) -> Result<NaiveDate, DispatchError> {
        if self.message == JuryMessage::Invitation {
            return Err(DispatchError::NotScheduled("jury invitations"));
        }
        let session = state
            .session(&target.session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", target.session_id)))?;
        let exam = session
            .anchor_date(Anchor::Exam)
            .ok_or_else(|| DispatchError::NoTriggerDate(format!("session {} exam", session.id)))?;
        Duration::try_days(self.lead_days)
            .and_then(|lead| exam.checked_sub_signed(lead))
            .ok_or_else(|| DispatchError::NoTriggerDate(format!("session {} exam", session.id)))
    }

    /// The reminder fires on the trigger day only, never late.
    fn is_due(&self, trigger: NaiveDate, today: NaiveDate) -> bool {
        trigger == today
    }

    fn already_dispatched(
        &self,
        state: &PersistedState,
        target: &JuryTarget,
    ) -> Result<bool, DispatchError> {
        let jury = Self::find(state, target)?;
        Ok(match self.message {
            JuryMessage::Invitation => jury.status.is_terminal(),
            JuryMessage::Reminder => jury.status.is_terminal() || jury.reminded_at.is_some(),
        })
    }

    fn attempt_send(
        &self,
        target: &JuryTarget,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport, DispatchError> {
        let claim = self.store.update_session(&target.session_id, |session| {
            let jury = session
                .invitation_mut(&target.invitation_id)
                .ok_or_else(|| missing(target))?;
            match self.message {
                JuryMessage::Invitation => jury.ensure_pending()?,
                JuryMessage::Reminder => jury.claim_reminder(now)?,
            }
            let token = jury.ensure_token().to_string();
            jury.last_attempt_at = Some(now);
            let jury = jury.clone();

            let message = match self.message {
                JuryMessage::Invitation => {
                    messages::jury_invitation(&self.base_url, session, &jury, &token)
                }
                JuryMessage::Reminder => {
                    messages::jury_reminder(&self.base_url, session, &jury, &token)
                }
            };
            Ok::<_, DispatchError>(Claim {
                email: jury.email,
                phone: jury.phone,
                message,
            })
        })?;

        Ok(self
            .notifier
            .deliver(claim.email.as_deref(), claim.phone.as_deref(), &claim.message))
    }

    fn record_outcome(
        &self,
        target: &JuryTarget,
        report: &DeliveryReport,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let message = self.message;
        self.update(target, |jury| {
            match report.error_summary() {
                None => match message {
                    JuryMessage::Invitation => jury.mark_notified(now),
                    JuryMessage::Reminder => jury.mark_reminded(now),
                },
                Some(error) => {
                    if message == JuryMessage::Reminder {
                        jury.release_reminder_claim();
                    }
                    jury.record_failure(error)
                }
            }
            Ok(())
        })
    }

    fn record_error(&self, target: &JuryTarget, error: &DispatchError, _now: DateTime<Utc>) {
        if matches!(error, DispatchError::Store(StoreError::NotFound(_))) {
            return;
        }
        let text = error.to_string();
        if let Err(nested) = self.update(target, |jury| {
            jury.record_failure(text);
            Ok(())
        }) {
            tracing::warn!(target = %target, error = %nested, "could not record dispatch error");
        }
    }
}
