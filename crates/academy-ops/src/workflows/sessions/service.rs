use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{Session, SessionId, SessionReport, StepView};
use super::catalog::RuleCatalog;
use super::domain::{Formation, SessionError};
use super::invitation::{
    InvitationError, InvitationId, JuryInvitation, JuryStatus, ResponseChoice, ResponseOutcome,
};
use crate::config::SchedulingConfig;
use crate::dates;
use crate::store::{StateStore, StoreError};
use crate::workflows::dispatch::{
    dispatch_target, JobEntry, JuryDispatch, JuryMessage, JuryTarget, Notifier, TargetOutcome,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub name: String,
    pub formation: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub exam_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachJury {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomDateRequest {
    #[serde(default)]
    pub custom_date: Option<String>,
}

/// Jury fields safe to show to operators. The token never leaves the store
/// except inside a confirmation link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JuryView {
    pub id: InvitationId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: JuryStatus,
    pub notified_at: Option<DateTime<Utc>>,
    pub reminded_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&JuryInvitation> for JuryView {
    fn from(jury: &JuryInvitation) -> Self {
        Self {
            id: jury.id.clone(),
            name: jury.name.clone(),
            email: jury.email.clone(),
            phone: jury.phone.clone(),
            status: jury.status,
            notified_at: jury.notified_at,
            reminded_at: jury.reminded_at,
            responded_at: jury.responded_at,
            last_attempt_at: jury.last_attempt_at,
            last_error: jury.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub formation: String,
    pub start_date: Option<String>,
    pub exam_date: Option<String>,
    pub archived: bool,
    pub report: SessionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: SessionId,
    pub name: String,
    pub formation: String,
    pub start_date: Option<String>,
    pub exam_date: Option<String>,
    pub archived: bool,
    pub checklist: Vec<StepView>,
    pub report: SessionReport,
    pub jurys: Vec<JuryView>,
}

/// Result of a confirmation link, echoed back to the participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RespondResult {
    pub session_name: String,
    pub jury_name: String,
    pub outcome: ResponseOutcome,
}

/// Use cases over sessions and their jury invitations.
pub struct SessionService<S> {
    store: Arc<S>,
    notifier: Arc<Notifier>,
    config: SchedulingConfig,
}

impl<S> SessionService<S>
where
    S: StateStore + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<Notifier>, config: SchedulingConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        dates::local_today(now, self.config.timezone)
    }

    pub fn create_session(
        &self,
        request: NewSession,
        now: DateTime<Utc>,
    ) -> Result<SessionDetail, SessionServiceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(SessionServiceError::Invalid("name is required".to_string()));
        }
        let formation = Formation::from_code(&request.formation).ok_or_else(|| {
            SessionServiceError::Invalid(format!("unknown formation '{}'", request.formation))
        })?;
        for (field, value) in [
            ("start_date", request.start_date.as_deref()),
            ("exam_date", request.exam_date.as_deref()),
        ] {
            dates::parse_optional(value, field);
        }

        let session = Session::new(
            SessionId::generate(),
            name,
            formation.code().to_string(),
            non_empty(request.start_date),
            non_empty(request.exam_date),
            &RuleCatalog::for_formation(formation),
        );
        let detail = self.detail(&session, now);
        self.store.transact(move |state| {
            state.sessions.push(session);
            Ok::<_, StoreError>(())
        })?;
        tracing::info!(session_id = %detail.id, formation = formation.code(), "created session");
        Ok(detail)
    }

    /// Lists every session, syncing checklists first so new catalog rules show up.
    pub fn list_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>, SessionServiceError> {
        let mut state = self.store.snapshot()?;
        let stale = state.sessions.iter_mut().any(|session| {
            let catalog = session.catalog();
            session.sync_steps(&catalog) > 0
        });
        if stale {
            state = self.store.transact(|state| {
                for session in &mut state.sessions {
                    let catalog = session.catalog();
                    session.sync_steps(&catalog);
                }
                Ok::<_, StoreError>(state.clone())
            })?;
        }

        let today = self.today(now);
        Ok(state
            .sessions
            .iter()
            .map(|session| SessionSummary {
                id: session.id.clone(),
                name: session.name.clone(),
                formation: session.formation.clone(),
                start_date: session.start_date.clone(),
                exam_date: session.exam_date.clone(),
                archived: session.archived,
                report: session.report(&session.catalog(), today),
            })
            .collect())
    }

    pub fn get_session(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionDetail, SessionServiceError> {
        let session = self.synced(id)?;
        Ok(self.detail(&session, now))
    }

    pub fn report(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionReport, SessionServiceError> {
        let session = self.synced(id)?;
        Ok(session.report(&session.catalog(), self.today(now)))
    }

    pub fn delete_session(&self, id: &SessionId) -> Result<(), SessionServiceError> {
        self.store.transact(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|session| &session.id != id);
            if state.sessions.len() == before {
                return Err(SessionServiceError::NotFound(format!("session {id}")));
            }
            Ok(())
        })?;
        tracing::info!(session_id = %id, "deleted session");
        Ok(())
    }

    pub fn toggle_step(
        &self,
        id: &SessionId,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<SessionDetail, SessionServiceError> {
        let session = self.store.update_session(id, |session| {
            let catalog = session.catalog();
            session.sync_steps(&catalog);
            let done = session.toggle_step(index, now)?;
            tracing::info!(session_id = %id, index, done, archived = session.archived, "toggled step");
            Ok::<_, SessionServiceError>(session.clone())
        })?;
        Ok(self.detail(&session, now))
    }

    pub fn set_custom_date(
        &self,
        id: &SessionId,
        index: usize,
        custom_date: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SessionDetail, SessionServiceError> {
        if let Some(raw) = custom_date.as_deref() {
            dates::parse_optional(Some(raw), "custom_date");
        }
        let session = self.store.update_session(id, |session| {
            session.set_custom_date(index, custom_date)?;
            Ok::<_, SessionServiceError>(session.clone())
        })?;
        Ok(self.detail(&session, now))
    }

    pub fn attach_jury(
        &self,
        id: &SessionId,
        request: AttachJury,
    ) -> Result<JuryView, SessionServiceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(SessionServiceError::Invalid("jury name is required".to_string()));
        }
        let jury = JuryInvitation::new(name, non_empty(request.email), non_empty(request.phone));
        let view = JuryView::from(&jury);
        self.store.update_session(id, move |session| {
            session.jurys.push(jury);
            Ok::<_, SessionServiceError>(())
        })?;
        tracing::info!(session_id = %id, invitation_id = %view.id, "attached jury");
        Ok(view)
    }

    /// Sends the invitation to the selected juries, or to all of them when
    /// `invitation_ids` is empty.
    pub fn notify(
        &self,
        id: &SessionId,
        invitation_ids: &[InvitationId],
        now: DateTime<Utc>,
    ) -> Result<Vec<JobEntry>, SessionServiceError> {
        self.dispatch(id, invitation_ids, JuryMessage::Invitation, now)
    }

    /// Operator-triggered reminder. Ignores the exam-date offset but still
    /// refuses answered juries and anyone already reminded.
    pub fn remind(
        &self,
        id: &SessionId,
        invitation_ids: &[InvitationId],
        now: DateTime<Utc>,
    ) -> Result<Vec<JobEntry>, SessionServiceError> {
        self.dispatch(id, invitation_ids, JuryMessage::Reminder, now)
    }

    /// Applies the answer carried by a confirmation link.
    pub fn respond(
        &self,
        session_id: &SessionId,
        invitation_id: &InvitationId,
        token: &str,
        choice: ResponseChoice,
        now: DateTime<Utc>,
    ) -> Result<RespondResult, SessionServiceError> {
        let result = self.store.update_session(session_id, |session| {
            let session_name = session.name.clone();
            let jury = session
                .invitation_mut(invitation_id)
                .ok_or_else(|| SessionError::InvitationNotFound(invitation_id.to_string()))?;
            let outcome = jury.respond(token, choice, now)?;
            Ok::<_, SessionServiceError>(RespondResult {
                session_name,
                jury_name: jury.name.clone(),
                outcome,
            })
        });

        match &result {
            Ok(result) => tracing::info!(
                session_id = %session_id,
                invitation_id = %invitation_id,
                status = result.outcome.status.label(),
                changed = result.outcome.changed,
                "jury responded"
            ),
            Err(SessionServiceError::Invitation(InvitationError::InvalidToken)) => tracing::warn!(
                session_id = %session_id,
                invitation_id = %invitation_id,
                "rejected confirmation with bad token"
            ),
            Err(_) => {}
        }
        result
    }

    fn dispatch(
        &self,
        id: &SessionId,
        invitation_ids: &[InvitationId],
        message: JuryMessage,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobEntry>, SessionServiceError> {
        let state = self.store.snapshot()?;
        let session = state
            .session(id)
            .ok_or_else(|| SessionServiceError::NotFound(format!("session {id}")))?;

        let selected: Vec<InvitationId> = if invitation_ids.is_empty() {
            session.jurys.iter().map(|jury| jury.id.clone()).collect()
        } else {
            invitation_ids.to_vec()
        };

        let job = JuryDispatch::new(self.store.clone(), self.notifier.clone(), &self.config, message);
        Ok(selected
            .into_iter()
            .map(|invitation_id| {
                let target = JuryTarget {
                    session_id: id.clone(),
                    invitation_id,
                };
                let outcome = if session.invitation(&target.invitation_id).is_some() {
                    dispatch_target(&job, &target, now)
                } else {
                    TargetOutcome::Skipped("unknown invitation".to_string())
                };
                JobEntry {
                    target: target.to_string(),
                    outcome,
                }
            })
            .collect())
    }

    fn synced(&self, id: &SessionId) -> Result<Session, SessionServiceError> {
        let mut session = self
            .store
            .snapshot()?
            .session(id)
            .cloned()
            .ok_or_else(|| SessionServiceError::NotFound(format!("session {id}")))?;
        let catalog = session.catalog();
        if session.sync_steps(&catalog) == 0 {
            return Ok(session);
        }
        self.store.update_session(id, |session| {
            let catalog = session.catalog();
            session.sync_steps(&catalog);
            Ok::<_, SessionServiceError>(session.clone())
        })
    }

    fn detail(&self, session: &Session, now: DateTime<Utc>) -> SessionDetail {
        let catalog = session.catalog();
        let today = self.today(now);
        SessionDetail {
            id: session.id.clone(),
            name: session.name.clone(),
            formation: session.formation.clone(),
            start_date: session.start_date.clone(),
            exam_date: session.exam_date.clone(),
            archived: session.archived,
            checklist: session.checklist(&catalog, today),
            report: session.report(&catalog, today),
            jurys: session.jurys.iter().map(JuryView::from).collect(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<StoreError> for SessionServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}
