pub mod config;
pub mod correlation;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod narrative;
pub mod normalize;
pub mod scoring;
pub mod store;
pub mod ueba;

// Re-export commonly used types
pub use models::{CanonicalEvent, EntityProfile, Incident, IncidentDraft};
pub use correlation::CorrelationEngine;
pub use ingest::{IngestStatus, IngestionService};
pub use memory::IncidentMemory;
pub use narrative::{NarrativeGenerator, OllamaNarrativeClient, StaticNarrative};
pub use store::{EventStore, IncidentStore, ProfileStore, SqliteStore};
pub use ueba::{BehaviorEngine, ZScoreDetector};
