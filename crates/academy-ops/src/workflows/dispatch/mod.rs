//! Outbound notifications: channels, rendered messages and the scheduled
//! dispatch engine driving jury reminders and prospect follow-ups.

pub mod channel;
mod engine;
mod follow_up;
pub mod job;
mod jury;
pub mod messages;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{
    ChannelError, ChannelKind, ChannelOutcome, DeliveryReport, LogChannel, NotificationChannel,
    Notifier, OutboundMessage, WebhookChannel,
};
pub use engine::{spawn_scheduler, DispatchEngine, TickDigest, TickOutcome};
pub use follow_up::ProspectFollowUp;
pub use job::{dispatch_target, run_job, DispatchError, DispatchJob, JobEntry, JobReport, TargetOutcome};
pub use jury::{JuryDispatch, JuryMessage, JuryTarget};
pub use router::dispatch_router;
