//! SQLite implementation of the store traits

use super::{EventStore, IncidentStore, ProfileStore, StoreError, StoredEvent};
use crate::models::{
    CanonicalEvent, CorrelationTag, EntityProfile, Incident, IncidentStatus, Severity,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store implementing all three store traits.
///
/// All access goes through one `Mutex<Connection>`, which also
/// serializes the read-modify-write profile upsert: two concurrent
/// logins for the same entity cannot drop an observed IP or hour.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the specified path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn row_to_stored_event(row: &Row<'_>) -> rusqlite::Result<(i64, String)> {
        Ok((row.get(0)?, row.get(1)?))
    }

    fn decode_events(rows: Vec<(i64, String)>) -> Result<Vec<StoredEvent>, StoreError> {
        rows.into_iter()
            .map(|(id, doc)| {
                let event: CanonicalEvent = serde_json::from_str(&doc)?;
                Ok(StoredEvent { id, event })
            })
            .collect()
    }

    fn parse_timestamp(ts: i64) -> Result<DateTime<Utc>, StoreError> {
        DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| StoreError::InvalidData(format!("Invalid timestamp: {}", ts)))
    }
}

impl EventStore for SqliteStore {
    fn index_event(&self, event: &CanonicalEvent) -> Result<(), StoreError> {
        let doc = serde_json::to_string(event)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events
             (ts, category, action, outcome, kind, user, source_ip, host_ip,
              tx_account, tx_amount, risk_score, doc)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.timestamp.timestamp(),
                event.category.as_str(),
                event.action,
                event.outcome.as_str(),
                event.kind.as_str(),
                event.actor.user,
                event.actor.ip,
                event.host.as_ref().and_then(|h| h.ip.clone()),
                event.transaction.as_ref().and_then(|t| t.id.clone()),
                event.transaction.as_ref().and_then(|t| t.amount),
                event.risk.score,
                doc
            ],
        )?;
        Ok(())
    }

    fn failed_login_counts_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_ip, COUNT(*) AS attempts FROM events
             WHERE action = 'login_attempt' AND outcome = 'failure'
               AND ts >= ? AND source_ip IS NOT NULL
             GROUP BY source_ip
             HAVING attempts >= ?
             ORDER BY attempts DESC",
        )?;

        let rows = stmt
            .query_map(params![since.timestamp(), min_count], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn events_above_risk(
        &self,
        min_score: f64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, doc FROM events
             WHERE risk_score > ? AND ts >= ?
             ORDER BY ts DESC
             LIMIT ?",
        )?;

        let rows = stmt
            .query_map(
                params![min_score, since.timestamp(), limit],
                Self::row_to_stored_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Self::decode_events(rows)
    }

    fn behavioral_anomalies_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, doc FROM events
             WHERE kind = 'behavioral_anomaly' AND ts >= ?
             ORDER BY ts ASC",
        )?;

        let rows = stmt
            .query_map(params![since.timestamp()], Self::row_to_stored_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Self::decode_events(rows)
    }

    fn process_events_matching(
        &self,
        since: DateTime<Utc>,
        user: Option<&str>,
        host_ip: Option<&str>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        if user.is_none() && host_ip.is_none() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, doc FROM events
             WHERE category = 'process' AND ts >= ?1
               AND ((?2 IS NOT NULL AND user = ?2)
                 OR (?3 IS NOT NULL AND host_ip = ?3))
             ORDER BY ts ASC",
        )?;

        let rows = stmt
            .query_map(
                params![since.timestamp(), user, host_ip],
                Self::row_to_stored_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Self::decode_events(rows)
    }

    fn daily_success_login_counts(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<u64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT COUNT(*) FROM events
             WHERE user = ? AND action = 'login_attempt' AND outcome = 'success'
               AND ts >= ?
             GROUP BY date(ts, 'unixepoch')
             ORDER BY date(ts, 'unixepoch')",
        )?;

        let counts = stmt
            .query_map(params![user, since.timestamp()], |row| row.get(0))?
            .collect::<Result<Vec<u64>, _>>()?;

        Ok(counts)
    }

    fn transaction_amounts(
        &self,
        account: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tx_amount FROM events
             WHERE tx_account = ? AND action = 'transaction'
               AND ts >= ? AND tx_amount IS NOT NULL
             ORDER BY ts ASC",
        )?;

        let amounts = stmt
            .query_map(params![account, since.timestamp()], |row| row.get(0))?
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(amounts)
    }

    fn prune_events_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM events WHERE ts < ?",
            params![before.timestamp()],
        )?;
        Ok(deleted)
    }
}

impl ProfileStore for SqliteStore {
    fn get_profile(&self, entity_id: &str) -> Result<Option<EntityProfile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT last_seen, observed_ips, observed_hours FROM profiles WHERE entity_id = ?",
        )?;

        let result = stmt.query_row(params![entity_id], |row| {
            let last_seen: i64 = row.get(0)?;
            let ips: String = row.get(1)?;
            let hours: String = row.get(2)?;
            Ok((last_seen, ips, hours))
        });

        match result {
            Ok((last_seen, ips, hours)) => {
                let observed_ips: BTreeSet<String> = serde_json::from_str(&ips)?;
                let observed_hours: BTreeSet<u32> = serde_json::from_str(&hours)?;
                Ok(Some(EntityProfile {
                    entity_id: entity_id.to_string(),
                    last_seen: Self::parse_timestamp(last_seen)?,
                    observed_ips,
                    observed_hours,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_login_observation(
        &self,
        entity_id: &str,
        ip: Option<&str>,
        hour: u32,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Read-modify-write under the connection lock so concurrent
        // observations for the same entity cannot lose an entry.
        let conn = self.conn.lock().unwrap();

        let existing = {
            let mut stmt = conn.prepare(
                "SELECT observed_ips, observed_hours FROM profiles WHERE entity_id = ?",
            )?;
            match stmt.query_row(params![entity_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            }) {
                Ok(found) => Some(found),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let (mut observed_ips, mut observed_hours): (BTreeSet<String>, BTreeSet<u32>) =
            match existing {
                Some((ips, hours)) => (serde_json::from_str(&ips)?, serde_json::from_str(&hours)?),
                None => (BTreeSet::new(), BTreeSet::new()),
            };

        if let Some(ip) = ip {
            if !ip.is_empty() {
                observed_ips.insert(ip.to_string());
            }
        }
        observed_hours.insert(hour);

        conn.execute(
            "INSERT OR REPLACE INTO profiles (entity_id, last_seen, observed_ips, observed_hours)
             VALUES (?, ?, ?, ?)",
            params![
                entity_id,
                seen_at.timestamp(),
                serde_json::to_string(&observed_ips)?,
                serde_json::to_string(&observed_hours)?
            ],
        )?;

        Ok(())
    }
}

impl IncidentStore for SqliteStore {
    fn store_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO incidents
             (id, created_at, title, severity, status, risk_score, rule_name,
              correlation_id, mitre_tactic, mitre_technique, narrative, message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                incident.id,
                incident.created_at.timestamp(),
                incident.title,
                incident.severity.as_str(),
                incident.status.as_str(),
                incident.risk_score,
                incident.rule_name,
                incident.correlation.as_ref().map(|c| c.id.clone()),
                incident.correlation.as_ref().and_then(|c| c.mitre_tactic.clone()),
                incident
                    .correlation
                    .as_ref()
                    .and_then(|c| c.mitre_technique.clone()),
                incident.narrative,
                incident.message
            ],
        )?;
        Ok(())
    }

    fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, title, severity, status, risk_score, rule_name,
                    correlation_id, mitre_tactic, mitre_technique, narrative, message
             FROM incidents
             ORDER BY created_at DESC
             LIMIT ?",
        )?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    id,
                    created_at,
                    title,
                    severity,
                    status,
                    risk_score,
                    rule_name,
                    correlation_id,
                    mitre_tactic,
                    mitre_technique,
                    narrative,
                    message,
                )| {
                    let status = match status.as_str() {
                        "open" => IncidentStatus::Open,
                        "closed" => IncidentStatus::Closed,
                        other => {
                            return Err(StoreError::InvalidData(format!(
                                "Unknown incident status: {}",
                                other
                            )))
                        }
                    };

                    Ok(Incident {
                        id,
                        created_at: Self::parse_timestamp(created_at)?,
                        title,
                        severity: Severity::parse(&severity),
                        status,
                        risk_score,
                        rule_name,
                        correlation: correlation_id.map(|cid| CorrelationTag {
                            id: cid,
                            mitre_tactic,
                            mitre_technique,
                        }),
                        narrative,
                        message,
                    })
                },
            )
            .collect()
    }
}
