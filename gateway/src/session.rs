//! Per-session state: tool-call history, time-decayed risk accumulation,
//! and the taint latch.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use ipg_guard::policy::Route;
use ipg_guard::taint::TaintState;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::RiskAccumulationConfig;

/// A single past tool call, retained for audit and for windowed risk sums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub risk_score: f64,
    pub route: Route,
}

/// All mutable state the gateway tracks for one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub history: Vec<ToolCallRecord>,
    pub taint: TaintState,
    risk_value: f64,
    risk_last_updated: DateTime<Utc>,
}

impl SessionState {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            history: Vec::new(),
            taint: TaintState::default(),
            risk_value: 0.0,
            risk_last_updated: Utc::now(),
        }
    }

    /// Append a call to history and fold its risk into the accumulator.
    pub fn record_call(&mut self, record: ToolCallRecord, accumulation: &RiskAccumulationConfig) {
        match accumulation {
            RiskAccumulationConfig::AdditiveDecay { half_life_secs } => {
                self.decay(*half_life_secs, record.timestamp);
                self.risk_value += record.risk_score;
            }
            RiskAccumulationConfig::WindowedSum { .. } => {
                // windowed sums are recomputed from history on read
                self.risk_last_updated = record.timestamp;
            }
        }
        self.history.push(record);
    }

    fn decay(&mut self, half_life_secs: f64, now: DateTime<Utc>) {
        let elapsed = (now - self.risk_last_updated).num_milliseconds().max(0) as f64 / 1000.0;
        if half_life_secs > 0.0 {
            let factor = 0.5f64.powf(elapsed / half_life_secs);
            self.risk_value *= factor;
        }
        self.risk_last_updated = now;
    }

    /// Current accumulated risk, decaying (for `additive_decay`) or
    /// pruning (for `windowed_sum`) as of `now` before returning.
    pub fn accumulated_risk(&mut self, accumulation: &RiskAccumulationConfig, now: DateTime<Utc>) -> f64 {
        match accumulation {
            RiskAccumulationConfig::AdditiveDecay { half_life_secs } => {
                self.decay(*half_life_secs, now);
                self.risk_value
            }
            RiskAccumulationConfig::WindowedSum { window_minutes } => {
                let cutoff = now - ChronoDuration::milliseconds((*window_minutes * 60_000.0) as i64);
                self.history.retain(|r| r.timestamp >= cutoff);
                self.history.iter().map(|r| r.risk_score).sum()
            }
        }
    }
}

/// Concurrent, per-session-locked store. Sessions never block each other;
/// within a session, mutations are serialized through the per-entry mutex.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Mutex<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Run `f` against the session's state, creating it if this is the
    /// first call seen for `session_id`.
    pub async fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> R {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Mutex::new(SessionState::new(session_id.to_string())));
        let mut guard = entry.lock().await;
        f(&mut guard)
    }

    /// Number of sessions tracked so far. Exists for tests asserting that a
    /// bypassed message (e.g. `tools/list`) never creates session state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
