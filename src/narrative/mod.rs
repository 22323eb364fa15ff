//! Narrative generator client
//!
//! Incident narratives come from an external language-generation
//! service and are consumed as opaque markdown. The trait seam lets
//! the correlation engine take any implementation (including test
//! doubles); the bundled client speaks the Ollama chat API with a
//! bounded timeout and a sentinel fallback, so a slow or down
//! generator never stalls incident persistence.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::NarrativeConfig;
use crate::models::{Incident, SimilarIncident};

/// Sentinel returned whenever the generator cannot be reached.
pub const FALLBACK_NARRATIVE: &str = "Error: narrative generator unavailable.";

/// Returned when the generator responds without content.
const EMPTY_RESPONSE: &str = "No response generated.";

const SYSTEM_INSTRUCTION: &str = "You are a Senior Security Analyst AI. Your goal is to analyze \
security incidents and provide actionable response playbooks locally. Do not ask for external data.";

const PLAYBOOK_TASK: &str = "Analyze the following security incident and generate a comprehensive \
Incident Response Playbook in Markdown format. Include: an executive summary, an analysis of why \
this is suspicious, immediate containment steps, long-term remediation, and investigation \
questions for the human analyst. Keep it professional, concise, and actionable.";

/// External narrative generation, injected into the correlation engine.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Produce narrative text for an incident. Implementations must
    /// return a fallback string rather than fail.
    async fn generate(&self, incident: &Incident, history: &[SimilarIncident]) -> String;
}

/// Client for an Ollama-style local chat endpoint.
pub struct OllamaNarrativeClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaNarrativeClient {
    pub fn new(url: &str, model: &str, timeout_seconds: u64) -> Self {
        OllamaNarrativeClient {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &NarrativeConfig) -> Self {
        Self::new(&config.url, &config.model, config.timeout_seconds)
    }

    fn build_prompt(incident: &Incident, history: &[SimilarIncident]) -> String {
        let incident_json =
            serde_json::to_string_pretty(incident).unwrap_or_else(|_| "{}".to_string());
        let history_json =
            serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Context: {}\n\nSimilar past incidents: {}\n\nTask: {}",
            incident_json, history_json, PLAYBOOK_TASK
        )
    }
}

#[async_trait]
impl NarrativeGenerator for OllamaNarrativeClient {
    async fn generate(&self, incident: &Incident, history: &[SimilarIncident]) -> String {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": Self::build_prompt(incident, history)}
            ],
            "stream": false
        });

        let response = match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Failed to reach narrative generator at {}: {}", self.url, e);
                return FALLBACK_NARRATIVE.to_string();
            }
        };

        if !response.status().is_success() {
            log::error!(
                "Narrative generator returned non-success status: {}",
                response.status()
            );
            return FALLBACK_NARRATIVE.to_string();
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| EMPTY_RESPONSE.to_string()),
            Err(e) => {
                log::error!("Failed to decode narrative response: {}", e);
                FALLBACK_NARRATIVE.to_string()
            }
        }
    }
}

/// Fixed-text generator used when narrative generation is disabled
/// (and as a test double).
pub struct StaticNarrative(pub String);

impl StaticNarrative {
    pub fn disabled() -> Self {
        StaticNarrative("Narrative generation disabled.".to_string())
    }
}

#[async_trait]
impl NarrativeGenerator for StaticNarrative {
    async fn generate(&self, _incident: &Incident, _history: &[SimilarIncident]) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, IncidentDraft, Severity};

    fn incident() -> Incident {
        Incident::from_draft(&IncidentDraft {
            title: "Brute Force Detected from 1.2.3.4".to_string(),
            severity: Severity::High,
            description: "5 failed logins".to_string(),
            entity: EntityRef::Ip("1.2.3.4".to_string()),
            rule_name: "brute_force_auth".to_string(),
            correlation_id: None,
            mitre: None,
        })
    }

    #[tokio::test]
    async fn test_unreachable_generator_returns_sentinel() {
        // Nothing listens on the discard port; connection fails fast
        let client = OllamaNarrativeClient::new("http://127.0.0.1:9/api/chat", "llama2", 2);
        let narrative = client.generate(&incident(), &[]).await;
        assert_eq!(narrative, FALLBACK_NARRATIVE);
    }

    #[tokio::test]
    async fn test_static_narrative() {
        let generator = StaticNarrative("canned".to_string());
        assert_eq!(generator.generate(&incident(), &[]).await, "canned");
    }

    #[test]
    fn test_prompt_carries_incident_and_history() {
        let incident = incident();
        let history = vec![SimilarIncident {
            id: "past-1".to_string(),
            title: "Brute Force Detected from 9.9.9.9".to_string(),
            created_at: chrono::Utc::now(),
            relevance: 2.4,
        }];
        let prompt = OllamaNarrativeClient::build_prompt(&incident, &history);
        assert!(prompt.contains("brute_force_auth"));
        assert!(prompt.contains("past-1"));
        assert!(prompt.contains("Task:"));
    }
}
