//! Keyword based severity classification for log lines

use crate::models::Severity;
use serde::{Deserialize, Serialize};

/// Keyword lists checked in priority order: critical, error, warn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityKeywords {
    pub critical: Vec<String>,
    pub error: Vec<String>,
    pub warn: Vec<String>,
}

impl Default for SeverityKeywords {
    fn default() -> Self {
        Self {
            critical: to_owned(&["critical", "crit", "panic", "emerg"]),
            error: to_owned(&["error", "failed", "failure", "fatal"]),
            warn: to_owned(&["warn", "warning"]),
        }
    }
}

fn to_owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Classifies a line by the first keyword group it contains
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    critical: Vec<String>,
    error: Vec<String>,
    warn: Vec<String>,
}

impl SeverityClassifier {
    pub fn new(keywords: SeverityKeywords) -> Self {
        let lower = |words: Vec<String>| {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
        };

        Self {
            critical: lower(keywords.critical),
            error: lower(keywords.error),
            warn: lower(keywords.warn),
        }
    }

    /// Matching is a case-insensitive substring search. Higher severities win.
    pub fn classify(&self, line: &str) -> Severity {
        let line = line.to_lowercase();
        let hit = |words: &[String]| words.iter().any(|w| line.contains(w.as_str()));

        if hit(&self.critical) {
            Severity::Critical
        } else if hit(&self.error) {
            Severity::Error
        } else if hit(&self.warn) {
            Severity::Warn
        } else {
            Severity::Info
        }
    }
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self::new(SeverityKeywords::default())
    }
}
