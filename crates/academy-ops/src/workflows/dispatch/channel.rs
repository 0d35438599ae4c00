use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl ChannelKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rendered notification. E-mail uses `subject` and `body`, SMS uses `short`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
    pub short: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("{channel} endpoint answered with status {status}")]
    Rejected { channel: ChannelKind, status: u16 },
    #[error("{channel} transport failed: {message}")]
    Transport {
        channel: ChannelKind,
        message: String,
    },
}

/// Outbound transport capability. Implementations must bound their own latency.
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Posts messages as JSON to an HTTP relay that performs the actual delivery.
pub struct WebhookChannel {
    kind: ChannelKind,
    url: String,
    agent: ureq::Agent,
}

impl WebhookChannel {
    pub fn new(kind: ChannelKind, url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            kind,
            url: url.into(),
            agent,
        }
    }
}

impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        let payload = match self.kind {
            ChannelKind::Email => json!({
                "to": recipient,
                "subject": message.subject,
                "body": message.body,
            }),
            ChannelKind::Sms => json!({
                "to": recipient,
                "body": message.short,
            }),
        };

        match self.agent.post(&self.url).send_json(&payload) {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(status)) => Err(ChannelError::Rejected {
                channel: self.kind,
                status,
            }),
            Err(other) => Err(ChannelError::Transport {
                channel: self.kind,
                message: other.to_string(),
            }),
        }
    }
}

/// Channel used when no relay is configured: the message is only logged.
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        tracing::info!(
            channel = %self.kind,
            recipient,
            subject = %message.subject,
            "notification relay not configured, message logged only"
        );
        Ok(())
    }
}

/// Per-channel result of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Sent,
    Failed(String),
    Skipped(&'static str),
}

impl ChannelOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for ChannelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}

impl DeliveryReport {
    pub fn any_success(&self) -> bool {
        self.email.is_sent() || self.sms.is_sent()
    }

    /// Failure digest stored on the entity when nothing went out.
    pub fn error_summary(&self) -> Option<String> {
        if self.any_success() {
            return None;
        }
        let failures: Vec<String> = [(ChannelKind::Email, &self.email), (ChannelKind::Sms, &self.sms)]
            .into_iter()
            .filter_map(|(kind, outcome)| match outcome {
                ChannelOutcome::Failed(reason) => Some(format!("{kind}: {reason}")),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            Some("no contact channel available".to_string())
        } else {
            Some(failures.join("; "))
        }
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "email {}, sms {}", self.email, self.sms)
    }
}

/// Fans one message out to the e-mail and SMS channels independently.
#[derive(Clone)]
pub struct Notifier {
    email: Arc<dyn NotificationChannel>,
    sms: Arc<dyn NotificationChannel>,
}

impl Notifier {
    pub fn new(email: Arc<dyn NotificationChannel>, sms: Arc<dyn NotificationChannel>) -> Self {
        Self { email, sms }
    }

    pub fn log_only() -> Self {
        Self::new(
            Arc::new(LogChannel::new(ChannelKind::Email)),
            Arc::new(LogChannel::new(ChannelKind::Sms)),
        )
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        let channel = |kind: ChannelKind, url: &Option<String>| -> Arc<dyn NotificationChannel> {
            match url {
                Some(url) => Arc::new(WebhookChannel::new(kind, url.clone(), config.timeout)),
                None => {
                    tracing::warn!(channel = %kind, "no relay configured, using log-only channel");
                    Arc::new(LogChannel::new(kind))
                }
            }
        };
        Self::new(
            channel(ChannelKind::Email, &config.email_webhook),
            channel(ChannelKind::Sms, &config.sms_webhook),
        )
    }

    pub fn deliver(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        message: &OutboundMessage,
    ) -> DeliveryReport {
        DeliveryReport {
            email: send_one(self.email.as_ref(), email, message, "no e-mail address"),
            sms: send_one(self.sms.as_ref(), phone, message, "no phone number"),
        }
    }
}

fn send_one(
    channel: &dyn NotificationChannel,
    recipient: Option<&str>,
    message: &OutboundMessage,
    missing: &'static str,
) -> ChannelOutcome {
    let Some(recipient) = recipient.map(str::trim).filter(|value| !value.is_empty()) else {
        return ChannelOutcome::Skipped(missing);
    };
    match channel.send(recipient, message) {
        Ok(()) => ChannelOutcome::Sent,
        Err(error) => {
            tracing::warn!(channel = %channel.kind(), recipient, error = %error, "send failed");
            ChannelOutcome::Failed(error.to_string())
        }
    }
}
