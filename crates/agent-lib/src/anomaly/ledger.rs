//! Bounded, newest-first record of recent alerts

use crate::models::AnomalyAlert;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Default number of alerts kept
pub const DEFAULT_LEDGER_CAPACITY: usize = 100;

/// Alerts ordered newest first, oldest evicted once full
///
/// Insert and eviction happen under one write lock, so readers never see
/// more than `capacity` entries. Reads return copies.
#[derive(Debug)]
pub struct AlertLedger {
    capacity: usize,
    alerts: RwLock<VecDeque<AnomalyAlert>>,
}

impl AlertLedger {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            alerts: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front. Returns the evicted oldest alert, if any.
    pub fn insert(&self, alert: AnomalyAlert) -> Option<AnomalyAlert> {
        let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        alerts.push_front(alert);
        if alerts.len() > self.capacity {
            alerts.pop_back()
        } else {
            None
        }
    }

    /// Point-in-time copy of every alert, newest first
    pub fn snapshot(&self) -> Vec<AnomalyAlert> {
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        alerts.iter().cloned().collect()
    }

    /// Copy of the `limit` newest alerts
    pub fn recent(&self, limit: usize) -> Vec<AnomalyAlert> {
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        alerts.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn alert(n: usize) -> AnomalyAlert {
        AnomalyAlert {
            alert_id: Uuid::new_v4(),
            device_id: format!("dev-{n}"),
            description: "Temperature too high: 150.0".to_string(),
            detected_value: n as f64,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_newest_first() {
        let ledger = AlertLedger::new(10);
        ledger.insert(alert(1));
        ledger.insert(alert(2));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot[0].device_id, "dev-2");
        assert_eq!(snapshot[1].device_id, "dev-1");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let ledger = AlertLedger::default();
        let mut evicted = Vec::new();
        for n in 1..=101 {
            if let Some(old) = ledger.insert(alert(n)) {
                evicted.push(old);
            }
        }

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 100);
        assert_eq!(snapshot[0].device_id, "dev-101");
        assert_eq!(snapshot[99].device_id, "dev-2");
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].device_id, "dev-1");
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ledger = AlertLedger::new(5);
        ledger.insert(alert(1));
        let snapshot = ledger.snapshot();
        ledger.insert(alert(2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_recent_limit() {
        let ledger = AlertLedger::new(5);
        for n in 1..=4 {
            ledger.insert(alert(n));
        }
        let recent = ledger.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].device_id, "dev-4");
        assert_eq!(ledger.recent(50).len(), 4);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let ledger = AlertLedger::new(0);
        ledger.insert(alert(1));
        ledger.insert(alert(2));
        assert_eq!(ledger.capacity(), 1);
        assert_eq!(ledger.snapshot()[0].device_id, "dev-2");
    }

    #[test]
    fn test_concurrent_inserts_never_exceed_capacity() {
        let ledger = Arc::new(AlertLedger::new(16));

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for n in 0..250 {
                        ledger.insert(alert(t * 1000 + n));
                    }
                })
            })
            .collect();

        let reader = {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    assert!(ledger.snapshot().len() <= 16);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(ledger.len(), 16);
    }
}
