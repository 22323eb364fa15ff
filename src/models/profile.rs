//! Per-entity behavioral profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Historical behavior summary for one entity (currently a user
/// identity). Sets only grow; the store appends, never overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProfile {
    pub entity_id: String,
    pub last_seen: DateTime<Utc>,
    pub observed_ips: BTreeSet<String>,
    /// Hours of day (0-23) at which logins have been observed.
    pub observed_hours: BTreeSet<u32>,
}

impl EntityProfile {
    pub fn empty(entity_id: &str) -> Self {
        EntityProfile {
            entity_id: entity_id.to_string(),
            last_seen: Utc::now(),
            observed_ips: BTreeSet::new(),
            observed_hours: BTreeSet::new(),
        }
    }
}
