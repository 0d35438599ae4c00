use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::channel::{ChannelError, ChannelKind, NotificationChannel, Notifier, OutboundMessage};

/// Channel double that records every delivery and can be switched to failing.
pub(crate) struct RecordingChannel {
    kind: ChannelKind,
    failing: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingChannel {
    pub(crate) fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            failing: Mutex::new(false),
            delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("channel mutex poisoned") = failing;
    }

    /// Makes every send block for `delay`, like a slow relay.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("channel mutex poisoned") = Some(delay);
    }

    pub(crate) fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().expect("channel mutex poisoned").clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().expect("channel mutex poisoned").len()
    }
}

impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        let delay = *self.delay.lock().expect("channel mutex poisoned");
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if *self.failing.lock().expect("channel mutex poisoned") {
            return Err(ChannelError::Transport {
                channel: self.kind,
                message: "relay unreachable".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("channel mutex poisoned")
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }
}

pub(crate) struct Channels {
    pub(crate) email: Arc<RecordingChannel>,
    pub(crate) sms: Arc<RecordingChannel>,
    pub(crate) notifier: Arc<Notifier>,
}

impl Channels {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.email.set_failing(failing);
        self.sms.set_failing(failing);
    }
}

pub(crate) fn recording_channels() -> Channels {
    let email = RecordingChannel::new(ChannelKind::Email);
    let sms = RecordingChannel::new(ChannelKind::Sms);
    let notifier = Arc::new(Notifier::new(email.clone(), sms.clone()));
    Channels {
        email,
        sms,
        notifier,
    }
}
