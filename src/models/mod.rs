//! Shared data model: canonical events, incidents and entity profiles.

pub mod event;
pub mod incident;
pub mod profile;

pub use event::{
    Actor, CanonicalEvent, Endpoint, EventCategory, EventKind, HostInfo, Network, Outcome,
    ProcessInfo, Risk, RiskLevel, Severity, TransactionInfo,
};
pub use incident::{
    CorrelationTag, EntityRef, Incident, IncidentDraft, IncidentStatus, MitreTags,
    SimilarIncident,
};
pub use profile::EntityProfile;
