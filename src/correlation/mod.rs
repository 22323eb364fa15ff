//! Correlation engine: rules over the event store producing incidents.
//!
//! The engine carries no state of its own across ticks; everything it
//! knows lives in the event and incident stores, so a tick is safely
//! re-runnable. Deduplication is advisory: similarity hits feed the
//! narrative generator as context but never suppress a new incident,
//! so re-running against an unchanged store creates a fresh incident
//! (with a fresh id) for a still-active condition.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CorrelationConfig;
use crate::memory::IncidentMemory;
use crate::models::{
    CanonicalEvent, EntityRef, Incident, IncidentDraft, MitreTags, Severity,
};
use crate::narrative::NarrativeGenerator;
use crate::store::{EventStore, IncidentStore, StoredEvent};

pub const BRUTE_FORCE_RULE: &str = "brute_force_auth";
pub const HIGH_RISK_RULE: &str = "critical_risk_event";
pub const KILL_CHAIN_RULE: &str = "kill_chain_initial_access_execution";

const KILL_CHAIN_TACTICS: &str = "Initial Access, Execution";
const KILL_CHAIN_TECHNIQUES: &str = "T1078, T1059";

/// How many similar past incidents are fetched as narrative context.
const SIMILAR_CONTEXT_LIMIT: usize = 3;

/// Rule evaluator producing incidents from windowed queries and
/// multi-hop event chains. Collaborators are injected so tests can
/// substitute store backends and the generator.
pub struct CorrelationEngine {
    events: Arc<dyn EventStore>,
    incidents: Arc<dyn IncidentStore>,
    memory: IncidentMemory,
    narrative: Arc<dyn NarrativeGenerator>,
    config: CorrelationConfig,
}

impl CorrelationEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        incidents: Arc<dyn IncidentStore>,
        narrative: Arc<dyn NarrativeGenerator>,
        config: CorrelationConfig,
    ) -> Self {
        CorrelationEngine {
            events,
            memory: IncidentMemory::new(incidents.clone()),
            incidents,
            narrative,
            config,
        }
    }

    /// Run all rules once and persist every detection. Returns the
    /// number of incidents created. All drafts from this tick are
    /// fully processed (context lookup, narrative, persist) before
    /// this returns.
    pub async fn run_correlation_rules(&self) -> usize {
        let mut drafts = Vec::new();
        drafts.extend(self.detect_brute_force());
        drafts.extend(self.detect_high_risk_events());
        drafts.extend(self.detect_kill_chains());

        let count = drafts.len();
        for draft in drafts {
            self.create_incident(draft).await;
        }
        count
    }

    /// Rule: at least N failed logins from the same IP within the
    /// configured window. One draft per offending IP.
    fn detect_brute_force(&self) -> Vec<IncidentDraft> {
        let since = Utc::now() - Duration::minutes(self.config.brute_force_window_minutes);

        let counts = match self
            .events
            .failed_login_counts_by_ip(since, self.config.brute_force_threshold)
        {
            Ok(counts) => counts,
            Err(e) => {
                log::error!("Correlation failed (brute_force): {}", e);
                return Vec::new();
            }
        };

        counts
            .into_iter()
            .map(|(ip, count)| IncidentDraft {
                title: format!("Brute Force Detected from {}", ip),
                severity: Severity::High,
                description: format!(
                    "Detected {} failed login attempts from IP {} in the last {} minutes.",
                    count, ip, self.config.brute_force_window_minutes
                ),
                entity: EntityRef::Ip(ip),
                rule_name: BRUTE_FORCE_RULE.to_string(),
                correlation_id: None,
                mitre: None,
            })
            .collect()
    }

    /// Rule: any event whose risk score exceeds the configured
    /// threshold within the last few minutes. One draft per event.
    fn detect_high_risk_events(&self) -> Vec<IncidentDraft> {
        let since = Utc::now() - Duration::minutes(self.config.high_risk_window_minutes);

        let hits = match self.events.events_above_risk(
            self.config.high_risk_min_score,
            since,
            self.config.high_risk_limit,
        ) {
            Ok(hits) => hits,
            Err(e) => {
                log::error!("Correlation failed (high_risk): {}", e);
                return Vec::new();
            }
        };

        hits.into_iter()
            .map(|hit| {
                let reason = hit
                    .event
                    .risk
                    .reason
                    .clone()
                    .unwrap_or_else(|| "High Risk Event".to_string());
                IncidentDraft {
                    title: "Critical Risk Event Detected".to_string(),
                    severity: Severity::Critical,
                    description: format!(
                        "Event with risk score > {}. Reason: {}",
                        self.config.high_risk_min_score, reason
                    ),
                    entity: EntityRef::EventId(hit.id),
                    rule_name: HIGH_RISK_RULE.to_string(),
                    correlation_id: None,
                    mitre: None,
                }
            })
            .collect()
    }

    /// Multi-hop rule: a behavioral-anomaly login followed by process
    /// execution tied to the same user or host. Triggers are walked in
    /// ascending timestamp order; the chain description lists every
    /// matching process event, not just the first.
    fn detect_kill_chains(&self) -> Vec<IncidentDraft> {
        let since = Utc::now() - Duration::minutes(self.config.kill_chain_window_minutes);

        let triggers = match self.events.behavioral_anomalies_since(since) {
            Ok(triggers) => triggers,
            Err(e) => {
                log::error!("Correlation failed (kill_chain): {}", e);
                return Vec::new();
            }
        };

        let mut drafts = Vec::new();
        for trigger in triggers {
            let user = trigger.event.actor.user.as_deref();
            let source_ip = trigger.event.actor.ip.as_deref();

            let executions = match self.events.process_events_matching(
                trigger.event.timestamp,
                user,
                source_ip,
            ) {
                Ok(executions) => executions,
                Err(e) => {
                    log::error!("Correlation failed (kill_chain match): {}", e);
                    continue;
                }
            };

            if executions.is_empty() {
                continue;
            }

            drafts.push(self.build_chain_draft(&trigger.event, &executions));
        }
        drafts
    }

    fn build_chain_draft(
        &self,
        trigger: &CanonicalEvent,
        executions: &[StoredEvent],
    ) -> IncidentDraft {
        let user = trigger.event_user_label();
        let source_ip = trigger.actor.ip.as_deref().unwrap_or("unknown");

        let mut stages = vec![format!(
            "1. Initial Access: Anomalous login by '{}' from {} ({})",
            user,
            source_ip,
            trigger
                .risk
                .reason
                .as_deref()
                .unwrap_or("behavioral anomaly")
        )];
        for (i, execution) in executions.iter().enumerate() {
            let process = execution.event.process.as_ref();
            let command_line = process
                .and_then(|p| p.command_line.as_deref())
                .unwrap_or("unknown command");
            let host = execution
                .event
                .host
                .as_ref()
                .and_then(|h| h.name.as_deref())
                .unwrap_or("unknown host");
            stages.push(format!(
                "{}. Execution: {} on {}",
                i + 2,
                command_line,
                host
            ));
        }

        IncidentDraft {
            title: format!(
                "Attack Chain Detected: Anomalous Access -> Execution ({})",
                user
            ),
            severity: Severity::Critical,
            description: stages.join("\n"),
            entity: match &trigger.actor.user {
                Some(user) => EntityRef::User(user.clone()),
                None => EntityRef::Ip(source_ip.to_string()),
            },
            rule_name: KILL_CHAIN_RULE.to_string(),
            correlation_id: Some(Uuid::new_v4().to_string()),
            mitre: Some(MitreTags {
                tactic: KILL_CHAIN_TACTICS.to_string(),
                technique: KILL_CHAIN_TECHNIQUES.to_string(),
            }),
        }
    }

    /// Persist one detection: context lookup, narrative, write. Every
    /// step degrades rather than fails the tick.
    async fn create_incident(&self, draft: IncidentDraft) {
        let mut incident = Incident::from_draft(&draft);

        let history = self.memory.search_similar(&incident, SIMILAR_CONTEXT_LIMIT);
        if !history.is_empty() {
            log::info!(
                "Found {} similar past incident(s) for '{}'",
                history.len(),
                incident.title
            );
        }

        log::info!("Generating narrative for: {}", incident.title);
        incident.narrative = self.narrative.generate(&incident, &history).await;

        match self.incidents.store_incident(&incident) {
            Ok(()) => log::info!("Created incident: {}", incident.title),
            Err(e) => log::error!("Failed to store incident: {}", e),
        }
    }
}

impl CanonicalEvent {
    fn event_user_label(&self) -> &str {
        self.actor.user.as_deref().unwrap_or("unknown")
    }
}
