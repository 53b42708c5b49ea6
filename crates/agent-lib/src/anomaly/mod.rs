//! Anomaly detection over device telemetry
//!
//! This module provides:
//! - Fixed-threshold rules producing alerts
//! - A bounded ledger of recent alerts
//! - A detector that records and re-publishes alerts

mod detector;
mod ledger;
mod rules;

pub use detector::{AnomalyDetector, DetectorWorker, DEFAULT_ALERT_SEND_TIMEOUT};
pub use ledger::{AlertLedger, DEFAULT_LEDGER_CAPACITY};
pub use rules::{AnomalyRuleEngine, RuleVerdict, HIGH_READING_THRESHOLD, LOW_READING_THRESHOLD};
