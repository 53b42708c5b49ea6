//! Fixed-threshold rules over telemetry records

use crate::models::{AnomalyAlert, DeviceStatus, TelemetryRecord};
use chrono::Utc;
use uuid::Uuid;

/// Readings above this are too hot
pub const HIGH_READING_THRESHOLD: f64 = 100.0;
/// Readings below this are too cold
pub const LOW_READING_THRESHOLD: f64 = -20.0;

const OFFLINE_DESCRIPTION: &str = "Device is offline but sending data !!";

/// Result of checking one record against the rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Normal,
    Anomaly { description: String },
}

impl RuleVerdict {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, RuleVerdict::Anomaly { .. })
    }
}

/// Evaluates telemetry against the reading and status rules
///
/// Rules are checked in order: high reading, low reading, offline status.
/// Several may hold at once; the first one names the alert.
#[derive(Debug, Clone, Default)]
pub struct AnomalyRuleEngine;

impl AnomalyRuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, record: &TelemetryRecord) -> RuleVerdict {
        let description = if record.reading > HIGH_READING_THRESHOLD {
            format!("Temperature too high: {:?}", record.reading)
        } else if record.reading < LOW_READING_THRESHOLD {
            format!("Temperature too low: {:?}", record.reading)
        } else if record.status == DeviceStatus::Offline {
            OFFLINE_DESCRIPTION.to_string()
        } else {
            return RuleVerdict::Normal;
        };

        RuleVerdict::Anomaly { description }
    }

    /// Build an alert for an anomalous record. Performs no I/O.
    pub fn evaluate(&self, record: &TelemetryRecord) -> Option<AnomalyAlert> {
        match self.check(record) {
            RuleVerdict::Normal => None,
            RuleVerdict::Anomaly { description } => Some(AnomalyAlert {
                alert_id: Uuid::new_v4(),
                device_id: record.device_id.clone(),
                description,
                detected_value: record.reading,
                timestamp: Utc::now(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reading: f64, status: DeviceStatus) -> TelemetryRecord {
        TelemetryRecord {
            device_id: "sensor-7".to_string(),
            status,
            reading,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_high_reading() {
        let alert = AnomalyRuleEngine::new()
            .evaluate(&record(150.0, DeviceStatus::Online))
            .unwrap();

        assert!(alert.description.contains("Temperature too high: 150.0"));
        assert_eq!(alert.device_id, "sensor-7");
        assert_eq!(alert.detected_value, 150.0);
    }

    #[test]
    fn test_low_reading() {
        let verdict = AnomalyRuleEngine::new().check(&record(-25.5, DeviceStatus::Online));
        assert_eq!(
            verdict,
            RuleVerdict::Anomaly {
                description: "Temperature too low: -25.5".to_string()
            }
        );
    }

    #[test]
    fn test_offline_with_normal_reading() {
        let alert = AnomalyRuleEngine::new()
            .evaluate(&record(50.0, DeviceStatus::Offline))
            .unwrap();
        assert_eq!(alert.description, "Device is offline but sending data !!");
    }

    #[test]
    fn test_normal_record_yields_nothing() {
        let engine = AnomalyRuleEngine::new();
        assert!(engine.evaluate(&record(50.0, DeviceStatus::Online)).is_none());
        // thresholds are exclusive
        assert!(engine.evaluate(&record(100.0, DeviceStatus::Online)).is_none());
        assert!(engine.evaluate(&record(-20.0, DeviceStatus::Online)).is_none());
    }

    #[test]
    fn test_reading_rule_names_alert_when_offline_too() {
        let alert = AnomalyRuleEngine::new()
            .evaluate(&record(120.0, DeviceStatus::Offline))
            .unwrap();
        assert_eq!(alert.description, "Temperature too high: 120.0");
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let engine = AnomalyRuleEngine::new();
        let r = record(150.0, DeviceStatus::Online);
        let a = engine.evaluate(&r).unwrap();
        let b = engine.evaluate(&r).unwrap();
        assert_ne!(a.alert_id, b.alert_id);
    }
}
