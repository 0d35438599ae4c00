use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::dates::lenient_timestamp;

const TOKEN_LENGTH: usize = 43;

/// How long an unfinished reminder claim keeps other senders out.
const REMINDER_CLAIM_LEASE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub String);

impl InvitationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for InvitationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attendance lifecycle of a jury member. `Present` and `Absent` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JuryStatus {
    #[default]
    Pending,
    Present,
    Absent,
}

impl JuryStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

/// Answer a jury member gives through the confirmation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseChoice {
    Present,
    Absent,
}

impl ResponseChoice {
    pub const fn status(self) -> JuryStatus {
        match self {
            Self::Present => JuryStatus::Present,
            Self::Absent => JuryStatus::Absent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid choice '{0}', expected 'present' or 'absent'")]
pub struct InvalidChoice(pub String);

impl FromStr for ResponseChoice {
    type Err = InvalidChoice;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvitationError {
    #[error("confirmation token does not match")]
    InvalidToken,
    #[error("invitation already answered ({})", .0.label())]
    Terminal(JuryStatus),
    #[error("reminder already sent")]
    AlreadyReminded,
    #[error("reminder already being sent")]
    ReminderInFlight,
}

/// Result of a `respond` call. `changed` is false when the link was re-used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponseOutcome {
    pub status: JuryStatus,
    pub changed: bool,
}

/// A jury member attached to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryInvitation {
    #[serde(default)]
    pub id: InvitationId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: JuryStatus,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub notified_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub reminded_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub reminder_claimed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl JuryInvitation {
    pub fn new(name: String, email: Option<String>, phone: Option<String>) -> Self {
        let mut invitation = Self {
            id: InvitationId::generate(),
            name,
            email,
            phone,
            ..Self::default()
        };
        invitation.ensure_token();
        invitation
    }

    /// Returns the confirmation secret, generating it on first use only.
    pub fn ensure_token(&mut self) -> &str {
        let token = self.token.get_or_insert_with(generate_token);
        if token.is_empty() {
            *token = generate_token();
        }
        token
    }

    pub fn verify_token(&self, candidate: &str) -> bool {
        match self.token.as_deref() {
            Some(expected) if !expected.is_empty() => {
                expected.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }

    pub fn ensure_pending(&self) -> Result<(), InvitationError> {
        if self.status.is_terminal() {
            Err(InvitationError::Terminal(self.status))
        } else {
            Ok(())
        }
    }

    /// Guard for any reminder, scheduled or manual. A claim younger than the
    /// lease counts as taken.
    pub fn ensure_remindable(&self, now: DateTime<Utc>) -> Result<(), InvitationError> {
        self.ensure_pending()?;
        if self.reminded_at.is_some() {
            return Err(InvitationError::AlreadyReminded);
        }
        match self.reminder_claimed_at {
            Some(claimed) if now - claimed < Duration::minutes(REMINDER_CLAIM_LEASE_MINUTES) => {
                Err(InvitationError::ReminderInFlight)
            }
            _ => Ok(()),
        }
    }

    /// Reserves the single reminder slot before anything is sent.
    pub fn claim_reminder(&mut self, now: DateTime<Utc>) -> Result<(), InvitationError> {
        self.ensure_remindable(now)?;
        self.reminder_claimed_at = Some(now);
        Ok(())
    }

    pub fn release_reminder_claim(&mut self) {
        self.reminder_claimed_at = None;
    }

    pub fn mark_notified(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.notified_at = Some(now);
        self.last_error = None;
    }

    pub fn mark_reminded(&mut self, now: DateTime<Utc>) {
        self.reminder_claimed_at = None;
        if self.status.is_terminal() || self.reminded_at.is_some() {
            return;
        }
        self.reminded_at = Some(now);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }

    /// Applies a participant's answer. A terminal invitation echoes its
    /// recorded status without changing anything.
    pub fn respond(
        &mut self,
        token: &str,
        choice: ResponseChoice,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome, InvitationError> {
        if !self.verify_token(token) {
            return Err(InvitationError::InvalidToken);
        }

        if self.status.is_terminal() {
            return Ok(ResponseOutcome {
                status: self.status,
                changed: false,
            });
        }

        self.status = choice.status();
        self.responded_at = Some(now);
        Ok(ResponseOutcome {
            status: self.status,
            changed: true,
        })
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
