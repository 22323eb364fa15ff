//! User and entity behavior analytics
//!
//! Two independent detector families live here. The set-membership
//! path (`BehaviorEngine`) checks authentication events against the
//! entity's observed-IP/observed-hour profile and self-learns from
//! every login. The statistical path (`BaselineEngine` +
//! `ZScoreDetector`) computes day-bucketed baselines from the event
//! store and flags z-score outliers. They act on different event
//! categories and never fire on the same event.

use chrono::{Duration, Timelike, Utc};
use std::sync::Arc;

use crate::models::{CanonicalEvent, EventCategory};
use crate::store::{EventStore, ProfileStore, StoreError};

/// Fixed boost for a login from a never-before-seen IP.
pub const NEW_IP_BOOST: f64 = 15.0;
/// Fixed boost for a login at an hour outside the observed set.
pub const UNUSUAL_HOUR_BOOST: f64 = 10.0;
/// The unusual-hour check needs more than this many distinct observed
/// hours before it is allowed to fire (guard against sparse history).
pub const MIN_OBSERVED_HOURS: usize = 5;

/// Historical window for login-count baselines, in days.
pub const LOGIN_BASELINE_DAYS: i64 = 30;
/// Historical window for transaction-amount baselines, in days.
pub const TRANSACTION_BASELINE_DAYS: i64 = 90;

/// Minimum sample buckets before a z-score is meaningful.
const MIN_BASELINE_SAMPLES: usize = 5;
/// Three-sigma threshold.
const Z_THRESHOLD: f64 = 3.0;

/// Result of a behavioral analysis pass.
#[derive(Debug, Clone)]
pub struct BehaviorVerdict {
    pub is_anomaly: bool,
    pub risk_boost: f64,
    pub reason: Option<String>,
}

impl BehaviorVerdict {
    fn none() -> Self {
        BehaviorVerdict {
            is_anomaly: false,
            risk_boost: 0.0,
            reason: None,
        }
    }
}

/// Set-membership behavioral analyzer over entity profiles.
pub struct BehaviorEngine {
    profiles: Arc<dyn ProfileStore>,
}

impl BehaviorEngine {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        BehaviorEngine { profiles }
    }

    /// Analyze an event against the entity's profile.
    ///
    /// Applies only to authentication login attempts carrying a user
    /// name. Whatever the verdict, the profile is updated with the
    /// observed IP and hour before this returns, so back-to-back
    /// events for the same entity see strictly increasing knowledge.
    /// A first-ever observation is never anomalous, and a profile
    /// fetch failure degrades to "no anomaly".
    pub fn analyze_behavior(&self, event: &CanonicalEvent) -> BehaviorVerdict {
        if event.category != EventCategory::Authentication || event.action != "login_attempt" {
            return BehaviorVerdict::none();
        }
        let username = match &event.actor.user {
            Some(name) if !name.is_empty() => name.as_str(),
            _ => return BehaviorVerdict::none(),
        };

        let profile = match self.profiles.get_profile(username) {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("Failed to fetch profile for {}: {}", username, e);
                None
            }
        };

        let current_ip = event.actor.ip.as_deref().filter(|ip| !ip.is_empty());
        let current_hour = event.timestamp.hour();

        let mut anomalies = Vec::new();
        let mut risk_boost = 0.0;

        if let Some(profile) = &profile {
            if let Some(ip) = current_ip {
                if !profile.observed_ips.contains(ip) {
                    anomalies.push(format!("Login from new IP: {}", ip));
                    risk_boost += NEW_IP_BOOST;
                }
            }

            if profile.observed_hours.len() > MIN_OBSERVED_HOURS
                && !profile.observed_hours.contains(&current_hour)
            {
                anomalies.push(format!("Login at unusual hour: {}:00", current_hour));
                risk_boost += UNUSUAL_HOUR_BOOST;
            }
        }

        // Self-learning: record the observation regardless of verdict
        if let Err(e) =
            self.profiles
                .record_login_observation(username, current_ip, current_hour, Utc::now())
        {
            log::warn!("Failed to update profile for {}: {}", username, e);
        }

        if anomalies.is_empty() {
            BehaviorVerdict::none()
        } else {
            BehaviorVerdict {
                is_anomaly: true,
                risk_boost,
                reason: Some(anomalies.join("; ")),
            }
        }
    }
}

/// Derived baseline statistics over a bounded historical window.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStatistic {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 for fewer than two values.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn baseline_from(values: &[f64]) -> BaselineStatistic {
    let mean = mean(values);
    BaselineStatistic {
        mean,
        std_dev: sample_std_dev(values, mean),
        sample_count: values.len(),
    }
}

/// Computes per-entity baselines through event-store aggregations.
pub struct BaselineEngine {
    events: Arc<dyn EventStore>,
}

impl BaselineEngine {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        BaselineEngine { events }
    }

    /// Mean and std-dev of successful logins per day for a user over
    /// the last `LOGIN_BASELINE_DAYS` days. Days without logins
    /// contribute no bucket.
    pub fn login_count_baseline(&self, username: &str) -> Result<BaselineStatistic, StoreError> {
        let since = Utc::now() - Duration::days(LOGIN_BASELINE_DAYS);
        let counts = self.events.daily_success_login_counts(username, since)?;
        let values: Vec<f64> = counts.into_iter().map(|c| c as f64).collect();
        Ok(baseline_from(&values))
    }

    /// Mean and std-dev of transaction amounts for an account over
    /// the last `TRANSACTION_BASELINE_DAYS` days.
    pub fn transaction_amount_baseline(
        &self,
        account: &str,
    ) -> Result<BaselineStatistic, StoreError> {
        let since = Utc::now() - Duration::days(TRANSACTION_BASELINE_DAYS);
        let amounts = self.events.transaction_amounts(account, since)?;
        Ok(baseline_from(&amounts))
    }
}

/// Computes a z-score against a baseline, or `None` when the baseline
/// cannot support one (insufficient samples or zero deviation).
pub fn z_score(baseline: &BaselineStatistic, observed: f64) -> Option<f64> {
    if baseline.sample_count < MIN_BASELINE_SAMPLES {
        return None;
    }
    if baseline.std_dev == 0.0 {
        return None;
    }
    Some((observed - baseline.mean) / baseline.std_dev)
}

/// Statistical anomaly detector on top of the baseline engine.
pub struct ZScoreDetector {
    baselines: BaselineEngine,
}

impl ZScoreDetector {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        ZScoreDetector {
            baselines: BaselineEngine::new(events),
        }
    }

    /// Two-sided three-sigma check on a user's daily login count.
    /// Returns `(is_anomaly, z_score)`; insufficient history is not
    /// an error and reports no anomaly.
    pub fn detect_login_anomaly(&self, username: &str, current_count: f64) -> (bool, f64) {
        let baseline = match self.baselines.login_count_baseline(username) {
            Ok(baseline) => baseline,
            Err(e) => {
                log::error!("Error calculating login baseline for {}: {}", username, e);
                return (false, 0.0);
            }
        };

        match z_score(&baseline, current_count) {
            Some(z) => (z.abs() > Z_THRESHOLD, z),
            None => (false, 0.0),
        }
    }

    /// One-sided three-sigma check on a transaction amount (only
    /// unusually high amounts are flagged).
    pub fn detect_transaction_anomaly(&self, account: &str, amount: f64) -> (bool, f64) {
        let baseline = match self.baselines.transaction_amount_baseline(account) {
            Ok(baseline) => baseline,
            Err(e) => {
                log::error!("Error calculating tx baseline for {}: {}", account, e);
                return (false, 0.0);
            }
        };

        match z_score(&baseline, amount) {
            Some(z) => (z > Z_THRESHOLD, z),
            None => (false, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, Outcome, TransactionInfo};
    use crate::store::SqliteStore;
    use chrono::{DateTime, TimeZone};

    fn login_event(user: &str, ip: &str, ts: DateTime<Utc>) -> CanonicalEvent {
        let mut event = CanonicalEvent::base("auth");
        event.timestamp = ts;
        event.category = EventCategory::Authentication;
        event.action = "login_attempt".to_string();
        event.outcome = Outcome::Success;
        event.kind = EventKind::Start;
        event.actor.user = Some(user.to_string());
        event.actor.ip = Some(ip.to_string());
        event
    }

    fn engine() -> (BehaviorEngine, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (BehaviorEngine::new(store.clone()), store)
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_first_login_never_anomalous_but_learned() {
        let (engine, store) = engine();

        let verdict = engine.analyze_behavior(&login_event("alice", "10.0.0.5", at_hour(9)));
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.risk_boost, 0.0);

        let profile = store.get_profile("alice").unwrap().unwrap();
        assert!(profile.observed_ips.contains("10.0.0.5"));
        assert!(profile.observed_hours.contains(&9));
    }

    #[test]
    fn test_known_ip_never_flags() {
        let (engine, _store) = engine();
        engine.analyze_behavior(&login_event("alice", "10.0.0.5", at_hour(9)));

        let verdict = engine.analyze_behavior(&login_event("alice", "10.0.0.5", at_hour(9)));
        assert!(!verdict.is_anomaly);
    }

    #[test]
    fn test_new_ip_flags_with_exact_boost() {
        let (engine, _store) = engine();
        engine.analyze_behavior(&login_event("alice", "10.0.0.5", at_hour(9)));

        let verdict = engine.analyze_behavior(&login_event("alice", "45.10.20.30", at_hour(9)));
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.risk_boost, 15.0);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Login from new IP: 45.10.20.30")
        );
    }

    #[test]
    fn test_unusual_hour_guard_at_five_hours() {
        let (engine, _store) = engine();

        // Exactly 5 observed hours: the guard keeps the check quiet
        for hour in 8..13 {
            engine.analyze_behavior(&login_event("bob", "10.0.0.5", at_hour(hour)));
        }
        let verdict = engine.analyze_behavior(&login_event("bob", "10.0.0.5", at_hour(3)));
        assert!(!verdict.is_anomaly, "must not fire with only 5 known hours");

        // Now 6 observed hours (3:00 was learned above), a 7th new one fires
        let verdict = engine.analyze_behavior(&login_event("bob", "10.0.0.5", at_hour(22)));
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.risk_boost, 10.0);
        assert_eq!(verdict.reason.as_deref(), Some("Login at unusual hour: 22:00"));
    }

    #[test]
    fn test_both_signals_sum_and_join() {
        let (engine, _store) = engine();
        for hour in 8..14 {
            engine.analyze_behavior(&login_event("carol", "10.0.0.5", at_hour(hour)));
        }

        let verdict = engine.analyze_behavior(&login_event("carol", "203.0.113.7", at_hour(2)));
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.risk_boost, 25.0);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Login from new IP: 203.0.113.7; Login at unusual hour: 2:00")
        );
    }

    #[test]
    fn test_non_auth_events_ignored() {
        let (engine, store) = engine();

        let mut event = CanonicalEvent::base("edr");
        event.category = EventCategory::Process;
        event.action = "process_started".to_string();
        event.actor.user = Some("alice".to_string());

        let verdict = engine.analyze_behavior(&event);
        assert!(!verdict.is_anomaly);
        assert!(store.get_profile("alice").unwrap().is_none());
    }

    #[test]
    fn test_missing_user_ignored() {
        let (engine, _store) = engine();
        let mut event = login_event("x", "10.0.0.5", at_hour(9));
        event.actor.user = None;
        assert!(!engine.analyze_behavior(&event).is_anomaly);
    }

    #[test]
    fn test_z_score_guards() {
        // Fewer than 5 samples: never an anomaly regardless of values
        let sparse = BaselineStatistic {
            mean: 10.0,
            std_dev: 1.0,
            sample_count: 4,
        };
        assert!(z_score(&sparse, 1_000_000.0).is_none());

        // Zero deviation: cannot compute
        let flat = BaselineStatistic {
            mean: 10.0,
            std_dev: 0.0,
            sample_count: 30,
        };
        assert!(z_score(&flat, 1_000_000.0).is_none());

        let healthy = BaselineStatistic {
            mean: 10.0,
            std_dev: 2.0,
            sample_count: 30,
        };
        assert_eq!(z_score(&healthy, 18.0), Some(4.0));
    }

    #[test]
    fn test_baseline_statistics() {
        let stats = baseline_from(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.sample_count, 8);
        assert!((stats.std_dev - 2.138).abs() < 0.001);

        let single = baseline_from(&[3.0]);
        assert_eq!(single.std_dev, 0.0);

        let empty = baseline_from(&[]);
        assert_eq!(empty.mean, 0.0);
        assert_eq!(empty.sample_count, 0);
    }

    #[test]
    fn test_transaction_detector_against_store() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let now = Utc::now();

        // 6 routine transactions around 100
        for (i, amount) in [100.0, 95.0, 105.0, 110.0, 90.0, 100.0].iter().enumerate() {
            let mut event = CanonicalEvent::base("transaction");
            event.timestamp = now - Duration::days(i as i64 + 1);
            event.category = EventCategory::Financial;
            event.action = "transaction".to_string();
            event.transaction = Some(TransactionInfo {
                id: Some("ACC-1".to_string()),
                amount: Some(*amount),
                currency: Some("USD".to_string()),
                kind: Some("DEBIT".to_string()),
                location: None,
            });
            use crate::store::EventStore;
            store.index_event(&event).unwrap();
        }

        let detector = ZScoreDetector::new(store.clone());

        let (is_anomaly, z) = detector.detect_transaction_anomaly("ACC-1", 5_000.0);
        assert!(is_anomaly);
        assert!(z > 3.0);

        let (is_anomaly, _) = detector.detect_transaction_anomaly("ACC-1", 102.0);
        assert!(!is_anomaly);

        // Unknown account: no history, no anomaly
        let (is_anomaly, z) = detector.detect_transaction_anomaly("ACC-404", 1_000_000.0);
        assert!(!is_anomaly);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_login_detector_insufficient_history() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let detector = ZScoreDetector::new(store);
        let (is_anomaly, z) = detector.detect_login_anomaly("alice", 500.0);
        assert!(!is_anomaly);
        assert_eq!(z, 0.0);
    }
}
