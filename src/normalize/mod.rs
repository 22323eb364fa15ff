//! Normalization pipeline: raw source payloads to the canonical schema.
//!
//! `normalize` is a pure projection of its inputs apart from the
//! wall-clock timestamp it stamps. Each source type has a fixed field
//! mapping; anything unknown takes the lossy fallback path rather than
//! failing, so normalization is total over arbitrary JSON.

use serde_json::Value;

use crate::models::{
    CanonicalEvent, Endpoint, EventCategory, EventKind, HostInfo, Network, Outcome, ProcessInfo,
    Severity, TransactionInfo,
};

/// Supported source types. Any other string falls back to the
/// uncategorized mapping.
pub const SOURCE_TYPES: &[&str] = &["auth", "transaction", "firewall", "edr", "os", "syslog"];

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn i64_field(raw: &Value, key: &str) -> Option<i64> {
    raw.get(key).and_then(|v| v.as_i64())
}

/// Normalize a raw payload into a canonical event.
pub fn normalize(raw: &Value, source_type: &str) -> CanonicalEvent {
    let mut event = CanonicalEvent::base(source_type);

    match source_type {
        "auth" => normalize_auth(&mut event, raw),
        "transaction" => normalize_transaction(&mut event, raw),
        "firewall" => normalize_firewall(&mut event, raw),
        "edr" => normalize_edr(&mut event, raw),
        "os" => normalize_os_event(&mut event, raw),
        "syslog" => normalize_syslog(&mut event, raw),
        other => {
            // Deliberate lossy fallback for unknown sources
            log::debug!("Unknown source type '{}', using fallback mapping", other);
            event.category = EventCategory::Uncategorized;
            event.message = Some(raw.to_string());
        }
    }

    event
}

fn normalize_auth(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::Authentication;
    event.action = "login_attempt".to_string();

    event.actor.user = str_field(raw, "username");
    event.actor.ip = str_field(raw, "ip_address");

    if let Some(severity) = str_field(raw, "severity") {
        event.severity = Severity::parse(&severity);
    }

    match raw.get("event_type").and_then(|v| v.as_str()) {
        Some("LOGIN_SUCCESS") => {
            event.outcome = Outcome::Success;
            event.kind = EventKind::Start;
        }
        Some("LOGIN_FAILED") => {
            event.outcome = Outcome::Failure;
            event.kind = EventKind::Info;
        }
        Some("LOGOUT") => {
            event.action = "logout".to_string();
            event.kind = EventKind::End;
            event.outcome = Outcome::Success;
        }
        _ => {
            event.outcome = Outcome::Unknown;
            event.kind = EventKind::Info;
        }
    }
}

fn normalize_transaction(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::Financial;
    event.action = "transaction".to_string();

    let empty = Value::Null;
    let tx = raw.get("transaction_data").unwrap_or(&empty);

    event.transaction = Some(TransactionInfo {
        // Account number serves as a loose transaction id
        id: str_field(tx, "account_number"),
        amount: tx.get("amount").and_then(|v| v.as_f64()),
        currency: Some("USD".to_string()),
        kind: str_field(tx, "transaction_type"),
        location: str_field(tx, "location"),
    });

    // Upstream transaction flagging carries explicit risk, which the
    // scorer treats as an override.
    if tx.get("is_flagged").and_then(|v| v.as_bool()).unwrap_or(false) {
        let amount = tx.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        event
            .risk
            .set_score(if amount > 10_000.0 { 100.0 } else { 50.0 });
        event.risk.reason = str_field(tx, "flag_reason");
    }
}

fn normalize_firewall(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::Network;
    event.kind = EventKind::Info;

    let action = str_field(raw, "action").unwrap_or_else(|| "allow".to_string());
    event.outcome = if action == "allow" {
        Outcome::Success
    } else {
        Outcome::Failure
    };
    event.action = action;

    event.actor.ip = str_field(raw, "src_ip");
    event.source = Some(Endpoint {
        ip: str_field(raw, "src_ip"),
        port: i64_field(raw, "src_port").and_then(|p| u16::try_from(p).ok()),
    });
    event.destination = Some(Endpoint {
        ip: str_field(raw, "dest_ip"),
        port: i64_field(raw, "dest_port").and_then(|p| u16::try_from(p).ok()),
    });
    event.network = Some(Network {
        protocol: str_field(raw, "protocol"),
    });
}

fn normalize_edr(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::Process;
    event.kind = EventKind::Start;
    event.action = "process_started".to_string();

    event.process = Some(ProcessInfo {
        name: str_field(raw, "process_name"),
        pid: i64_field(raw, "pid"),
        command_line: str_field(raw, "cmd_line"),
        executable: str_field(raw, "file_path"),
    });

    // Some agents ship `user` as a plain string, others as {"name": ...}
    event.actor.user = match raw.get("user") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(obj) => str_field(obj, "name"),
        None => None,
    };

    event.host = Some(HostInfo {
        name: Some(str_field(raw, "hostname").unwrap_or_else(|| "unknown-host".to_string())),
        ip: str_field(raw, "host_ip"),
    });
}

fn normalize_os_event(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::Host;
    event.action = str_field(raw, "event_type").unwrap_or_else(|| "system_event".to_string());
    event.message = str_field(raw, "message");
    event.host = Some(HostInfo {
        name: str_field(raw, "hostname"),
        ip: None,
    });
}

fn normalize_syslog(event: &mut CanonicalEvent, raw: &Value) {
    event.category = EventCategory::System;
    event.message = Some(str_field(raw, "message").unwrap_or_default());
    event.process = Some(ProcessInfo {
        name: Some(str_field(raw, "process").unwrap_or_else(|| "unknown".to_string())),
        ..ProcessInfo::default()
    });
}
