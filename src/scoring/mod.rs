//! Deterministic risk scoring
//!
//! `calculate_risk` is a pure lookup-table function. Explicit risk set
//! upstream (e.g. by transaction flagging during normalization) always
//! wins over the computed score; the anomaly boost is added by the
//! ingestion orchestration afterwards, and only then is the final
//! value clamped and banded. That order is load-bearing: it decides
//! which band an event lands in.

use crate::models::{CanonicalEvent, Severity};

/// Maximum risk score.
pub const MAX_RISK: f64 = 100.0;

fn base_score(action: &str) -> f64 {
    match action {
        "login_attempt" => 5.0,
        "transaction" => 0.0,
        "file_access" => 2.0,
        _ => 1.0,
    }
}

fn severity_multiplier(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 1.0,
        Severity::Medium => 2.0,
        Severity::High => 5.0,
        Severity::Critical => 10.0,
    }
}

/// Calculate a risk score in [0, 100] for an event.
///
/// An explicit positive score already on the event overrides the
/// computed value entirely; otherwise the score is
/// `base_score(action) * severity_multiplier(severity)`, capped.
pub fn calculate_risk(event: &CanonicalEvent) -> f64 {
    if event.risk.score > 0.0 {
        return event.risk.score.min(MAX_RISK);
    }

    (base_score(&event.action) * severity_multiplier(event.severity)).min(MAX_RISK)
}

/// Compose the final risk for an event: override-or-compute, add the
/// anomaly boost, clamp, band. Mutates the event's risk in place.
pub fn apply_risk(event: &mut CanonicalEvent, anomaly_boost: f64) {
    let base = calculate_risk(event);
    event.risk.set_score(base + anomaly_boost);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, RiskLevel};

    fn event_with(action: &str, severity: Severity) -> CanonicalEvent {
        let mut event = CanonicalEvent::base("auth");
        event.category = EventCategory::Authentication;
        event.action = action.to_string();
        event.severity = severity;
        event
    }

    #[test]
    fn test_lookup_tables() {
        assert_eq!(calculate_risk(&event_with("login_attempt", Severity::Low)), 5.0);
        assert_eq!(calculate_risk(&event_with("login_attempt", Severity::Medium)), 10.0);
        assert_eq!(calculate_risk(&event_with("login_attempt", Severity::High)), 25.0);
        assert_eq!(calculate_risk(&event_with("login_attempt", Severity::Critical)), 50.0);
        assert_eq!(calculate_risk(&event_with("transaction", Severity::Critical)), 0.0);
        assert_eq!(calculate_risk(&event_with("file_access", Severity::Medium)), 4.0);
        assert_eq!(calculate_risk(&event_with("something_else", Severity::High)), 5.0);
    }

    #[test]
    fn test_explicit_risk_overrides() {
        let mut event = event_with("login_attempt", Severity::Critical);
        event.risk.set_score(42.0);
        // Explicit wins over the computed 50.0
        assert_eq!(calculate_risk(&event), 42.0);
    }

    #[test]
    fn test_zero_explicit_risk_does_not_override() {
        let event = event_with("login_attempt", Severity::High);
        assert_eq!(event.risk.score, 0.0);
        assert_eq!(calculate_risk(&event), 25.0);
    }

    #[test]
    fn test_apply_risk_composition_order() {
        // Computed 25 + boost 25 lands in the high band
        let mut event = event_with("login_attempt", Severity::High);
        apply_risk(&mut event, 25.0);
        assert_eq!(event.risk.score, 50.0);
        assert_eq!(event.risk.level, RiskLevel::High);

        // Override 90 + boost 50 clamps to 100
        let mut event = event_with("transaction", Severity::Low);
        event.risk.set_score(90.0);
        apply_risk(&mut event, 50.0);
        assert_eq!(event.risk.score, 100.0);
        assert_eq!(event.risk.level, RiskLevel::Critical);
    }

    #[test]
    fn test_risk_always_in_range() {
        for action in ["login_attempt", "transaction", "file_access", "x"] {
            for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
                for boost in [0.0, 15.0, 25.0, 50.0, 500.0] {
                    let mut event = event_with(action, severity);
                    apply_risk(&mut event, boost);
                    assert!(event.risk.score >= 0.0 && event.risk.score <= 100.0);
                }
            }
        }
    }
}
