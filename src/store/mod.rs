//! Store module for event, profile and incident persistence
//!
//! The pipeline treats the datastore as an external collaborator: the
//! traits below describe exactly the queries the core needs, and the
//! bundled SQLite implementation is the reference backend. Components
//! hold trait objects so tests and deployments can substitute their
//! own backends.

pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{CanonicalEvent, EntityProfile, Incident};

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data in store: {0}")]
    InvalidData(String),
}

/// A canonical event as read back from the store, together with the
/// store-assigned document id.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub event: CanonicalEvent,
}

/// Canonical event store: one document per ingested log, plus the
/// windowed queries and aggregations the detectors and rules need.
pub trait EventStore: Send + Sync {
    /// Write one canonical event document.
    fn index_event(&self, event: &CanonicalEvent) -> Result<(), StoreError>;

    /// Failed login-attempt counts per source IP since `since`,
    /// restricted to IPs with at least `min_count` failures.
    fn failed_login_counts_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<(String, u64)>, StoreError>;

    /// Events with `risk.score > min_score` since `since`, newest
    /// first, capped at `limit`.
    fn events_above_risk(
        &self,
        min_score: f64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Behavioral-anomaly events since `since`, oldest first.
    fn behavioral_anomalies_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Process-category events at or after `since` whose actor user
    /// matches `user` or whose host IP matches `host_ip`, oldest
    /// first. With neither filter present the result is empty.
    fn process_events_matching(
        &self,
        since: DateTime<Utc>,
        user: Option<&str>,
        host_ip: Option<&str>,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Successful login-attempt counts per calendar day for a user
    /// since `since`. Days without logins produce no bucket.
    fn daily_success_login_counts(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<u64>, StoreError>;

    /// Transaction amounts for an account since `since`.
    fn transaction_amounts(
        &self,
        account: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>, StoreError>;

    /// Remove events older than `before`. Returns the number removed.
    fn prune_events_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Per-entity behavioral profile store. Updates are append-only: the
/// observation upsert only ever adds to the observed sets, and updates
/// for one entity are serialized by the backend.
pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, entity_id: &str) -> Result<Option<EntityProfile>, StoreError>;

    /// Record a login observation: add the IP (when present) and hour
    /// to the entity's observed sets and refresh `last_seen`.
    fn record_login_observation(
        &self,
        entity_id: &str,
        ip: Option<&str>,
        hour: u32,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Incident store: one document per detection firing, plus the recent
/// slice the similarity lookup and the CLI read.
pub trait IncidentStore: Send + Sync {
    fn store_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Most recent incidents, newest first.
    fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>, StoreError>;
}
