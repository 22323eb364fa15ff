//! Incident documents produced by the correlation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Severity;

/// MITRE ATT&CK tags attached by multi-stage rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitreTags {
    pub tactic: String,
    pub technique: String,
}

/// Reference to the entity a detection is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Ip(String),
    User(String),
    EventId(i64),
}

/// Unpersisted candidate detection produced by a rule, prior to
/// dedup lookup and narrative enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDraft {
    pub title: String,
    pub severity: Severity,
    pub description: String,
    pub entity: EntityRef,
    pub rule_name: String,
    pub correlation_id: Option<String>,
    pub mitre: Option<MitreTags>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Closed => "closed",
        }
    }
}

/// Correlation metadata carried on a persisted incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationTag {
    pub id: String,
    pub mitre_tactic: Option<String>,
    pub mitre_technique: Option<String>,
}

/// Persisted incident document. Created once per detection firing and
/// never automatically closed or merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub risk_score: f64,
    pub rule_name: String,
    pub correlation: Option<CorrelationTag>,
    /// Opaque text supplied by the external narrative generator.
    pub narrative: String,
    /// Human-readable summary (the draft description).
    pub message: String,
}

impl Incident {
    /// Build a persisted incident from a rule draft. The risk score is
    /// a fixed mapping from severity, not a computed value.
    pub fn from_draft(draft: &IncidentDraft) -> Self {
        let correlation = match (&draft.correlation_id, &draft.mitre) {
            (None, None) => None,
            (id, mitre) => Some(CorrelationTag {
                id: id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                mitre_tactic: mitre.as_ref().map(|m| m.tactic.clone()),
                mitre_technique: mitre.as_ref().map(|m| m.technique.clone()),
            }),
        };

        Incident {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            title: draft.title.clone(),
            severity: draft.severity,
            status: IncidentStatus::Open,
            risk_score: if draft.severity == Severity::Critical {
                100.0
            } else {
                75.0
            },
            rule_name: draft.rule_name.clone(),
            correlation,
            narrative: String::new(),
            message: draft.description.clone(),
        }
    }
}

/// Row returned by incident-memory similarity lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub relevance: f64,
}
