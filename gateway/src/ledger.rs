//! Append-only, SHA-256 hash-chained audit log.
//!
//! Every entry's hash covers its own fields plus the previous entry's hash,
//! so any edit or reordering of a past line breaks the chain from that
//! point forward. Write failures are logged and swallowed rather than
//! retried or propagated -- the ledger trades audit completeness for
//! gateway availability, a deliberate choice recorded in `DESIGN.md`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::LedgerError;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

/// One ledger record, serialized one-per-line as JSON.
///
/// `trigger`, `action`, and `outcome` are free-form JSON objects rather than
/// fixed structs -- different event types carry different detail (a deny
/// records `outcome.routed_to`, a route records the issued warrant's `kid`)
/// and the ledger itself never interprets them, only hashes and stores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: String,
    pub trigger: Value,
    pub action: Value,
    pub outcome: Value,
    pub accumulated_risk: f64,
    pub risk_history_length: usize,
    pub previous_hash: String,
    pub hash: String,
}

fn canonical_json(entry_without_hash: &LedgerEntry) -> String {
    let value = serde_json::to_value(CoreFields {
        event_id: &entry_without_hash.event_id,
        timestamp: entry_without_hash.timestamp,
        session_id: &entry_without_hash.session_id,
        event_type: &entry_without_hash.event_type,
        trigger: &entry_without_hash.trigger,
        action: &entry_without_hash.action,
        outcome: &entry_without_hash.outcome,
        accumulated_risk: entry_without_hash.accumulated_risk,
        risk_history_length: entry_without_hash.risk_history_length,
    })
    .expect("core ledger fields always serialize");
    let map: BTreeMap<String, serde_json::Value> = match value {
        serde_json::Value::Object(obj) => obj.into_iter().collect(),
        _ => unreachable!("core fields always serialize to an object"),
    };
    serde_json::to_string(&map).expect("sorted map always serializes")
}

#[derive(Serialize)]
struct CoreFields<'a> {
    event_id: &'a str,
    timestamp: DateTime<Utc>,
    session_id: &'a str,
    event_type: &'a str,
    trigger: &'a Value,
    action: &'a Value,
    outcome: &'a Value,
    accumulated_risk: f64,
    risk_history_length: usize,
}

fn calculate_hash(entry_without_hash: &LedgerEntry) -> String {
    let canonical = canonical_json(entry_without_hash);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(entry_without_hash.previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct ForensicLedger {
    path: PathBuf,
    fsync: bool,
    last_hash: Mutex<String>,
    file: Mutex<File>,
}

impl ForensicLedger {
    pub async fn open(path: PathBuf, fsync: bool) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let last_hash = Self::recover_last_hash(&path).await?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(LedgerError::Open)?;
        Ok(Self {
            path,
            fsync,
            last_hash: Mutex::new(last_hash),
            file: Mutex::new(file),
        })
    }

    async fn recover_last_hash(path: &PathBuf) -> Result<String, LedgerError> {
        let Ok(file) = File::open(path).await else {
            return Ok(GENESIS_HASH.to_string());
        };
        let mut reader = BufReader::new(file).lines();
        let mut last_hash = GENESIS_HASH.to_string();
        while let Some(line) = reader.next_line().await.map_err(LedgerError::Open)? {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<LedgerEntry>(&line) {
                last_hash = entry.hash;
            }
        }
        Ok(last_hash)
    }

    /// Append a new entry and return its `event_id`. Logs and returns an
    /// empty string on write failure without retrying -- see module docs.
    pub async fn log_event(
        &self,
        session_id: &str,
        event_type: &str,
        trigger: Value,
        action: Value,
        outcome: Value,
        accumulated_risk: f64,
        risk_history_length: usize,
    ) -> String {
        let mut last_hash = self.last_hash.lock().await;
        let event_id = Uuid::new_v4().to_string();
        let mut entry = LedgerEntry {
            event_id: event_id.clone(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            event_type: event_type.to_string(),
            trigger,
            action,
            outcome,
            accumulated_risk,
            risk_history_length,
            previous_hash: last_hash.clone(),
            hash: String::new(),
        };
        entry.hash = calculate_hash(&entry);

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize ledger entry");
                return String::new();
            }
        };

        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, path = ?self.path, "failed to append ledger entry");
            return String::new();
        }
        if let Err(e) = file.write_all(b"\n").await {
            tracing::error!(error = %e, path = ?self.path, "failed to append ledger newline");
            return String::new();
        }
        if self.fsync {
            if let Err(e) = file.sync_data().await {
                tracing::error!(error = %e, path = ?self.path, "failed to fsync ledger");
                return String::new();
            }
        }
        *last_hash = entry.hash;
        event_id
    }
}

/// Verifies that every entry's hash matches its recomputed value and that
/// `previous_hash` links correctly, in order, from genesis.
pub fn verify_chain(entries: &[LedgerEntry]) -> bool {
    let mut expected_previous = GENESIS_HASH.to_string();
    for entry in entries {
        if entry.previous_hash != expected_previous {
            return false;
        }
        let recomputed = calculate_hash(entry);
        if recomputed != entry.hash {
            return false;
        }
        expected_previous = entry.hash.clone();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, &str)]) -> Value {
        serde_json::Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        )
    }

    #[tokio::test]
    async fn genesis_previous_hash_is_64_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = ForensicLedger::open(path.clone(), false).await.unwrap();
        let event_id = ledger
            .log_event(
                "s1",
                "tool_call",
                obj(&[("tool_name", "read_file")]),
                obj(&[("routed_to", "production")]),
                obj(&[("status", "ok")]),
                0.1,
                1,
            )
            .await;
        assert!(!event_id.is_empty());
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let entry: LedgerEntry = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(entry.event_id, event_id);
        assert_eq!(entry.previous_hash, GENESIS_HASH);
        assert_eq!(entry.previous_hash.len(), 64);
    }

    #[tokio::test]
    async fn chain_links_across_appends_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let ledger = ForensicLedger::open(path.clone(), false).await.unwrap();
            ledger
                .log_event(
                    "s1",
                    "tool_call",
                    obj(&[("tool_name", "read_file")]),
                    obj(&[("routed_to", "production")]),
                    obj(&[("status", "ok")]),
                    0.1,
                    1,
                )
                .await;
        }
        {
            // Simulate a restart: last_hash must be recovered from disk.
            let ledger = ForensicLedger::open(path.clone(), false).await.unwrap();
            ledger
                .log_event(
                    "s1",
                    "tool_call",
                    obj(&[("tool_name", "write_file")]),
                    obj(&[("routed_to", "shadow")]),
                    obj(&[("status", "ok")]),
                    0.5,
                    2,
                )
                .await;
        }
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let entries: Vec<LedgerEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].previous_hash, entries[0].hash);
        assert!(verify_chain(&entries));
    }

    #[tokio::test]
    async fn tampering_with_an_entry_breaks_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = ForensicLedger::open(path.clone(), false).await.unwrap();
        ledger
            .log_event(
                "s1",
                "tool_call",
                obj(&[("tool_name", "read_file")]),
                obj(&[("routed_to", "production")]),
                obj(&[("status", "ok")]),
                0.1,
                1,
            )
            .await;
        ledger
            .log_event(
                "s1",
                "tool_call",
                obj(&[("tool_name", "write_file")]),
                obj(&[("routed_to", "production")]),
                obj(&[("status", "ok")]),
                0.4,
                2,
            )
            .await;
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let mut entries: Vec<LedgerEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        entries[0].accumulated_risk = 0.99;
        assert!(!verify_chain(&entries));
    }
}
