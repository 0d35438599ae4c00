//! Prospects awaiting a one-time commercial follow-up offer.

pub mod domain;
pub mod pricing;
pub mod router;
pub mod service;

pub use domain::{NewProspect, Prospect, ProspectId};
pub use pricing::{compute_offer, FollowUpPolicy, Offer};
pub use router::prospect_router;
pub use service::{ProspectService, ProspectServiceError};
