//! Training sessions: compliance checklists with computed deadlines and the
//! jury invitations attached to each exam.

mod aggregate;
pub mod catalog;
mod deadline;
pub mod domain;
mod invitation;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use aggregate::{Session, SessionId, SessionReport, StepInstance, StepView};
pub use catalog::RuleCatalog;
pub use deadline::{classify, resolve, Deadline};
pub use domain::{Anchor, Direction, DueRule, Formation, SessionError, StepRule, StepStatus};
pub use invitation::{
    InvalidChoice, InvitationError, InvitationId, JuryInvitation, JuryStatus, ResponseChoice,
    ResponseOutcome,
};
pub use router::session_router;
pub use service::{
    AttachJury, CustomDateRequest, JuryView, NewSession, RespondResult, SessionDetail,
    SessionService, SessionServiceError, SessionSummary,
};
