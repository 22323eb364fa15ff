//! Ingestion orchestration
//!
//! One logical operation from the caller's perspective:
//! normalize -> anomaly detection -> risk scoring -> persist. Every
//! sub-step is best-effort; only a failed final write reports
//! `Failed`, and nothing here panics or propagates errors.

use serde_json::Value;
use std::sync::Arc;

use crate::models::{EventCategory, EventKind};
use crate::normalize;
use crate::scoring;
use crate::store::{EventStore, ProfileStore};
use crate::ueba::{BehaviorEngine, ZScoreDetector};

/// Flat risk boost applied to statistically anomalous transactions.
const TRANSACTION_ANOMALY_BOOST: f64 = 50.0;

/// Outcome reported to the caller of `ingest_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Indexed,
    Failed,
}

/// Service wrapping the ingestion pipeline. Store handles are injected
/// at construction so tests can substitute their own backends.
pub struct IngestionService {
    events: Arc<dyn EventStore>,
    behavior: BehaviorEngine,
    detector: ZScoreDetector,
}

impl IngestionService {
    pub fn new(events: Arc<dyn EventStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        IngestionService {
            behavior: BehaviorEngine::new(profiles),
            detector: ZScoreDetector::new(events.clone()),
            events,
        }
    }

    /// Ingest one raw log entry.
    pub fn ingest_log(&self, raw: &Value, source_type: &str) -> IngestStatus {
        let mut event = normalize::normalize(raw, source_type);
        let mut anomaly_boost = 0.0;

        if event.category == EventCategory::Authentication && event.action == "login_attempt" {
            let verdict = self.behavior.analyze_behavior(&event);
            if verdict.is_anomaly {
                event.kind = EventKind::BehavioralAnomaly;
                if let Some(reason) = &verdict.reason {
                    event.risk.append_reason(reason);
                    log::info!("Behavioral anomaly detected: {}", reason);
                }
                anomaly_boost += verdict.risk_boost;
            }
        } else if event.category == EventCategory::Financial && event.action == "transaction" {
            let account = event
                .transaction
                .as_ref()
                .and_then(|t| t.id.clone());
            let amount = event
                .transaction
                .as_ref()
                .and_then(|t| t.amount)
                .unwrap_or(0.0);

            if let Some(account) = account {
                let (is_anomaly, z) = self.detector.detect_transaction_anomaly(&account, amount);
                if is_anomaly {
                    event.kind = EventKind::Anomaly;
                    event.risk.reason =
                        Some(format!("Transaction amount anomaly (z-score: {:.2})", z));
                    anomaly_boost = TRANSACTION_ANOMALY_BOOST;
                    log::info!(
                        "Transaction anomaly for account {} (z-score: {:.2})",
                        account,
                        z
                    );
                }
            }
        }

        scoring::apply_risk(&mut event, anomaly_boost);

        match self.events.index_event(&event) {
            Ok(()) => IngestStatus::Indexed,
            Err(e) => {
                log::error!("Failed to ingest log: {}", e);
                IngestStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use crate::store::SqliteStore;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn service() -> (IngestionService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (
            IngestionService::new(store.clone(), store.clone()),
            store,
        )
    }

    #[test]
    fn test_ingest_auth_baseline_then_anomaly() {
        let (service, store) = service();

        // Baseline login teaches the profile
        let status = service.ingest_log(
            &json!({
                "event_type": "LOGIN_SUCCESS",
                "username": "attacker_01",
                "ip_address": "10.0.0.5"
            }),
            "auth",
        );
        assert_eq!(status, IngestStatus::Indexed);

        // Same user from a strange IP flags and boosts
        let status = service.ingest_log(
            &json!({
                "event_type": "LOGIN_SUCCESS",
                "username": "attacker_01",
                "ip_address": "45.10.20.30"
            }),
            "auth",
        );
        assert_eq!(status, IngestStatus::Indexed);

        let anomalies = store
            .behavioral_anomalies_since(Utc::now() - Duration::minutes(5))
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        let event = &anomalies[0].event;
        assert_eq!(event.kind, EventKind::BehavioralAnomaly);
        // base 5.0 (login_attempt, low) + new-IP boost 15.0
        assert_eq!(event.risk.score, 20.0);
        assert_eq!(
            event.risk.reason.as_deref(),
            Some("Login from new IP: 45.10.20.30")
        );
    }

    #[test]
    fn test_ingest_transaction_anomaly_composes_boost() {
        let (service, store) = service();

        for amount in [100.0, 95.0, 105.0, 110.0, 90.0, 100.0] {
            service.ingest_log(
                &json!({
                    "transaction_data": {
                        "account_number": "ACC-7",
                        "amount": amount,
                        "transaction_type": "DEBIT"
                    }
                }),
                "transaction",
            );
        }

        let status = service.ingest_log(
            &json!({
                "transaction_data": {
                    "account_number": "ACC-7",
                    "amount": 5000.0,
                    "transaction_type": "DEBIT"
                }
            }),
            "transaction",
        );
        assert_eq!(status, IngestStatus::Indexed);

        // base 0 + anomaly boost 50 puts the event in the high band
        let hits = store
            .events_above_risk(40.0, Utc::now() - Duration::minutes(5), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        let event = &hits[0].event;
        assert_eq!(event.kind, EventKind::Anomaly);
        assert_eq!(event.risk.score, 50.0);
        assert_eq!(event.risk.level, RiskLevel::High);
        assert!(event
            .risk
            .reason
            .as_deref()
            .unwrap()
            .starts_with("Transaction amount anomaly (z-score:"));
    }

    #[test]
    fn test_ingest_flagged_transaction_keeps_explicit_risk() {
        let (service, store) = service();

        let status = service.ingest_log(
            &json!({
                "transaction_data": {
                    "account_number": "ACC-9",
                    "amount": 15000.0,
                    "is_flagged": true,
                    "flag_reason": "High Value Transaction (> 10000)"
                }
            }),
            "transaction",
        );
        assert_eq!(status, IngestStatus::Indexed);

        let hits = store
            .events_above_risk(90.0, Utc::now() - Duration::minutes(5), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event.risk.score, 100.0);
    }

    #[test]
    fn test_ingest_unknown_source_is_indexed() {
        let (service, _store) = service();
        let status = service.ingest_log(&json!({"anything": 1}), "mystery");
        assert_eq!(status, IngestStatus::Indexed);
    }
}
