//! Incident memory: similarity lookup over past incidents.
//!
//! Used purely as contextual enrichment for the narrative generator.
//! It never suppresses or merges a new incident, and a store failure
//! degrades to empty history.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Incident, SimilarIncident};
use crate::store::IncidentStore;

/// Weight for an identical rule name.
const RULE_NAME_WEIGHT: f64 = 2.0;
/// Weight for an exact MITRE tactic match.
const TACTIC_WEIGHT: f64 = 1.0;
/// Minimum title-token overlap for the fuzzy clause to count.
const TITLE_MATCH_FLOOR: f64 = 0.2;
/// How many recent incidents are considered as candidates.
const CANDIDATE_POOL: usize = 100;

/// Similarity search over persisted incidents.
pub struct IncidentMemory {
    incidents: Arc<dyn IncidentStore>,
}

impl IncidentMemory {
    pub fn new(incidents: Arc<dyn IncidentStore>) -> Self {
        IncidentMemory { incidents }
    }

    /// Find past incidents similar to the given one, ordered by
    /// relevance, excluding the incident itself. At least one clause
    /// (rule name, fuzzy title, MITRE tactic) must match.
    pub fn search_similar(&self, incident: &Incident, limit: usize) -> Vec<SimilarIncident> {
        let candidates = match self.incidents.recent_incidents(CANDIDATE_POOL) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("Failed to search incident memory: {}", e);
                return Vec::new();
            }
        };

        let tactic = incident
            .correlation
            .as_ref()
            .and_then(|c| c.mitre_tactic.as_deref());

        let mut scored: Vec<SimilarIncident> = candidates
            .into_iter()
            .filter(|candidate| candidate.id != incident.id)
            .filter_map(|candidate| {
                let mut relevance = 0.0;
                let mut matched = false;

                if candidate.rule_name == incident.rule_name {
                    relevance += RULE_NAME_WEIGHT;
                    matched = true;
                }

                let title_overlap = token_overlap(&candidate.title, &incident.title);
                if title_overlap >= TITLE_MATCH_FLOOR {
                    relevance += title_overlap;
                    matched = true;
                }

                if let (Some(tactic), Some(candidate_tactic)) = (
                    tactic,
                    candidate
                        .correlation
                        .as_ref()
                        .and_then(|c| c.mitre_tactic.as_deref()),
                ) {
                    if tactic == candidate_tactic {
                        relevance += TACTIC_WEIGHT;
                        matched = true;
                    }
                }

                if !matched {
                    return None;
                }

                Some(SimilarIncident {
                    id: candidate.id,
                    title: candidate.title,
                    created_at: candidate.created_at,
                    relevance,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        scored
    }
}

/// Jaccard overlap of lowercase title tokens; stands in for the fuzzy
/// text matching of a full-text store.
fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

fn tokenize(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, IncidentDraft, MitreTags, Severity};
    use crate::store::SqliteStore;

    fn draft(title: &str, rule: &str, tactic: Option<&str>) -> IncidentDraft {
        IncidentDraft {
            title: title.to_string(),
            severity: Severity::High,
            description: "test".to_string(),
            entity: EntityRef::Ip("1.2.3.4".to_string()),
            rule_name: rule.to_string(),
            correlation_id: tactic.map(|_| "corr".to_string()),
            mitre: tactic.map(|t| MitreTags {
                tactic: t.to_string(),
                technique: "T0000".to_string(),
            }),
        }
    }

    fn setup() -> (IncidentMemory, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (IncidentMemory::new(store.clone()), store)
    }

    #[test]
    fn test_same_rule_ranks_highest() {
        let (memory, store) = setup();

        let brute = Incident::from_draft(&draft(
            "Brute Force Detected from 203.0.113.9",
            "brute_force_auth",
            None,
        ));
        let unrelated = Incident::from_draft(&draft(
            "Critical Risk Event Detected",
            "critical_risk_event",
            None,
        ));
        store.store_incident(&brute).unwrap();
        store.store_incident(&unrelated).unwrap();

        let probe = Incident::from_draft(&draft(
            "Brute Force Detected from 198.51.100.4",
            "brute_force_auth",
            None,
        ));
        let similar = memory.search_similar(&probe, 3);

        assert!(!similar.is_empty());
        assert_eq!(similar[0].id, brute.id);
        // Rule weight plus fuzzy title overlap
        assert!(similar[0].relevance > 2.0);
    }

    #[test]
    fn test_excludes_self() {
        let (memory, store) = setup();

        let incident = Incident::from_draft(&draft("Solo Incident", "brute_force_auth", None));
        store.store_incident(&incident).unwrap();

        let similar = memory.search_similar(&incident, 3);
        assert!(similar.iter().all(|s| s.id != incident.id));
        assert!(similar.is_empty());
    }

    #[test]
    fn test_tactic_match_contributes() {
        let (memory, store) = setup();

        let chained = Incident::from_draft(&draft(
            "Attack Chain Detected",
            "kill_chain_initial_access_execution",
            Some("Initial Access, Execution"),
        ));
        store.store_incident(&chained).unwrap();

        let probe = Incident::from_draft(&draft(
            "Totally Different Words Here",
            "some_other_rule",
            Some("Initial Access, Execution"),
        ));
        let similar = memory.search_similar(&probe, 3);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].relevance, 1.0);
    }

    #[test]
    fn test_no_clause_no_result() {
        let (memory, store) = setup();

        let incident =
            Incident::from_draft(&draft("Alpha Beta Gamma", "rule_one", None));
        store.store_incident(&incident).unwrap();

        let probe = Incident::from_draft(&draft("Delta Epsilon", "rule_two", None));
        assert!(memory.search_similar(&probe, 3).is_empty());
    }

    #[test]
    fn test_limit_respected() {
        let (memory, store) = setup();

        for i in 0..5 {
            let incident = Incident::from_draft(&draft(
                &format!("Brute Force Detected from 10.0.0.{}", i),
                "brute_force_auth",
                None,
            ));
            store.store_incident(&incident).unwrap();
        }

        let probe = Incident::from_draft(&draft(
            "Brute Force Detected from 10.0.0.99",
            "brute_force_auth",
            None,
        ));
        assert_eq!(memory.search_similar(&probe, 3).len(), 3);
    }

    #[test]
    fn test_token_overlap() {
        assert_eq!(token_overlap("Brute Force", "Brute Force"), 1.0);
        assert!(token_overlap("Brute Force from 1.2.3.4", "Brute Force from 5.6.7.8") > 0.2);
        assert_eq!(token_overlap("alpha", "beta"), 0.0);
        assert_eq!(token_overlap("", "beta"), 0.0);
    }
}
