//! Resource-path trust classification and per-session taint latch.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// Trust classification of a resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustLevel {
    Green,
    Red,
}

impl TrustLevel {
    pub fn is_tainted(self) -> bool {
        matches!(self, TrustLevel::Red)
    }
}

/// Per-session taint state. Once latched `Red` it never reverts to `Green`
/// for the lifetime of the session — see [`TaintState::update`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaintState {
    pub level: Option<TrustLevel>,
    pub taint_source: Option<String>,
}

impl TaintState {
    /// Apply a newly observed resource classification to this state.
    ///
    /// `Green` never downgrades an existing `Red` latch; the first `Red`
    /// source is retained even if later sources are `Green`.
    pub fn update(&mut self, level: TrustLevel, source: &str) {
        match (self.level, level) {
            (Some(TrustLevel::Red), _) => {}
            (_, TrustLevel::Red) => {
                self.level = Some(TrustLevel::Red);
                self.taint_source = Some(source.to_string());
            }
            (None, TrustLevel::Green) => {
                self.level = Some(TrustLevel::Green);
                self.taint_source = Some(source.to_string());
            }
            (Some(TrustLevel::Green), TrustLevel::Green) => {
                self.taint_source = Some(source.to_string());
            }
        }
    }

    pub fn is_tainted(&self) -> bool {
        matches!(self.level, Some(TrustLevel::Red))
    }
}

/// Configuration for pattern-based resource trust classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintConfig {
    #[serde(default = "default_red_patterns")]
    pub red_patterns: Vec<String>,
    #[serde(default = "default_green_patterns")]
    pub green_patterns: Vec<String>,
    #[serde(default = "default_trust_green")]
    pub default_trust: TrustLevel,
}

fn default_red_patterns() -> Vec<String> {
    vec![
        "resume".into(),
        "upload".into(),
        "external".into(),
        "/shared/".into(),
        "attachment".into(),
    ]
}

fn default_green_patterns() -> Vec<String> {
    vec![
        "/private/".into(),
        "/real/".into(),
        "_conf_".into(),
        "system".into(),
        "internal".into(),
    ]
}

fn default_trust_green() -> TrustLevel {
    TrustLevel::Green
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self {
            red_patterns: default_red_patterns(),
            green_patterns: default_green_patterns(),
            default_trust: default_trust_green(),
        }
    }
}

/// Classifies resource path strings as trusted/untrusted.
///
/// Red patterns are checked before green ones: an untrusted marker anywhere
/// in the path always wins over a trusted marker.
pub struct TaintTracker {
    red: Vec<Regex>,
    green: Vec<Regex>,
    default_trust: TrustLevel,
}

impl TaintTracker {
    pub fn from_config(config: &TaintConfig) -> Result<Self, GuardError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, GuardError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| GuardError::InvalidPattern {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect()
        };
        Ok(Self {
            red: compile(&config.red_patterns)?,
            green: compile(&config.green_patterns)?,
            default_trust: config.default_trust,
        })
    }

    /// Classify a resource path, lowercased before matching.
    pub fn check_source_trust(&self, resource_path: &str) -> TrustLevel {
        let lowered = resource_path.to_lowercase();
        if self.red.iter().any(|re| re.is_match(&lowered)) {
            return TrustLevel::Red;
        }
        if self.green.iter().any(|re| re.is_match(&lowered)) {
            return TrustLevel::Green;
        }
        self.default_trust
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_pattern_wins_over_green() {
        let tracker = TaintTracker::from_config(&TaintConfig::default()).unwrap();
        assert_eq!(
            tracker.check_source_trust("/shared/attachment/system_report"),
            TrustLevel::Red
        );
    }

    #[test]
    fn unmatched_path_falls_back_to_default_trust() {
        let tracker = TaintTracker::from_config(&TaintConfig::default()).unwrap();
        assert_eq!(tracker.check_source_trust("/tmp/whatever"), TrustLevel::Green);
    }

    #[test]
    fn taint_latch_is_one_way() {
        let mut state = TaintState::default();
        state.update(TrustLevel::Red, "resume_upload");
        state.update(TrustLevel::Green, "/private/notes");
        assert!(state.is_tainted());
        assert_eq!(state.taint_source.as_deref(), Some("resume_upload"));
    }

    #[test]
    fn patterns_are_real_regexes_not_literal_substrings() {
        let config = TaintConfig {
            red_patterns: vec![r"\.secret$|/confidential/".into()],
            green_patterns: default_green_patterns(),
            default_trust: TrustLevel::Green,
        };
        let tracker = TaintTracker::from_config(&config).unwrap();
        assert_eq!(tracker.check_source_trust("/data/report.secret"), TrustLevel::Red);
        assert_eq!(tracker.check_source_trust("/data/confidential/report"), TrustLevel::Red);
        assert_eq!(tracker.check_source_trust("/data/secretary_notes"), TrustLevel::Green);
    }

    #[test]
    fn green_source_is_tracked_until_latched() {
        let mut state = TaintState::default();
        state.update(TrustLevel::Green, "/private/a");
        state.update(TrustLevel::Green, "/private/b");
        assert!(!state.is_tainted());
        assert_eq!(state.taint_source.as_deref(), Some("/private/b"));
    }
}
