//! Canonical event schema shared by every pipeline stage.
//!
//! A `CanonicalEvent` is immutable once indexed: the normalization
//! pipeline builds it, ingestion may stamp risk/anomaly results before
//! the write, and everything downstream only reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level event category assigned by normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Authentication,
    Network,
    Process,
    Financial,
    Host,
    System,
    Uncategorized,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::Network => "network",
            EventCategory::Process => "process",
            EventCategory::Financial => "financial",
            EventCategory::Host => "host",
            EventCategory::System => "system",
            EventCategory::Uncategorized => "uncategorized",
        }
    }
}

/// Outcome of the action described by the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Unknown => "unknown",
        }
    }
}

/// Lifecycle marker. `Anomaly` and `BehavioralAnomaly` are stamped by
/// the detectors during ingestion, the rest by normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    End,
    Info,
    Anomaly,
    BehavioralAnomaly,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::End => "end",
            EventKind::Info => "info",
            EventKind::Anomaly => "anomaly",
            EventKind::BehavioralAnomaly => "behavioral_anomaly",
        }
    }
}

/// Event severity as reported by the source (defaults to low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a raw severity string; anything unrecognized maps to low.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

/// Risk band derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Monotonic banding of a score in [0, 100].
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            RiskLevel::Critical
        } else if score > 40.0 {
            RiskLevel::High
        } else if score > 20.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Risk assessment attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub score: f64,
    pub level: RiskLevel,
    pub reason: Option<String>,
}

impl Risk {
    pub fn none() -> Self {
        Risk {
            score: 0.0,
            level: RiskLevel::Low,
            reason: None,
        }
    }

    /// Set the score, clamping to [0, 100] and re-deriving the band.
    pub fn set_score(&mut self, score: f64) {
        self.score = score.clamp(0.0, 100.0);
        self.level = RiskLevel::from_score(self.score);
    }

    /// Append a reason fragment, "; "-joined with any existing one.
    pub fn append_reason(&mut self, reason: &str) {
        match &mut self.reason {
            Some(existing) if !existing.is_empty() => {
                existing.push_str("; ");
                existing.push_str(reason);
            }
            _ => self.reason = Some(reason.to_string()),
        }
    }
}

impl Default for Risk {
    fn default() -> Self {
        Risk::none()
    }
}

/// Who performed the action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub user: Option<String>,
    pub ip: Option<String>,
}

/// Host the event occurred on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: Option<String>,
    pub ip: Option<String>,
}

/// Process details from EDR-style sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: Option<String>,
    pub pid: Option<i64>,
    pub command_line: Option<String>,
    pub executable: Option<String>,
}

/// Financial transaction details. The account number doubles as the
/// transaction entity id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub kind: Option<String>,
    pub location: Option<String>,
}

/// Network endpoint (firewall flows).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub protocol: Option<String>,
}

/// Normalized record in the shared schema, independent of the source
/// system. Sub-records stay `None` when the source does not provide
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub action: String,
    pub outcome: Outcome,
    pub kind: EventKind,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub actor: Actor,
    pub host: Option<HostInfo>,
    pub process: Option<ProcessInfo>,
    pub transaction: Option<TransactionInfo>,
    pub source: Option<Endpoint>,
    pub destination: Option<Endpoint>,
    pub network: Option<Network>,
    pub message: Option<String>,
    #[serde(default)]
    pub risk: Risk,
    /// Identifier of the mapping strategy that produced this event.
    pub source_type: String,
}

impl CanonicalEvent {
    /// Base document with required fields populated and everything
    /// else empty. Normalization strategies override from here.
    pub fn base(source_type: &str) -> Self {
        CanonicalEvent {
            timestamp: Utc::now(),
            category: EventCategory::Host,
            action: "log".to_string(),
            outcome: Outcome::Unknown,
            kind: EventKind::Info,
            severity: Severity::Low,
            actor: Actor::default(),
            host: None,
            process: None,
            transaction: None,
            source: None,
            destination: None,
            network: None,
            message: None,
            risk: Risk::none(),
            source_type: source_type.to_string(),
        }
    }
}
