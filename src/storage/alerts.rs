//! Alert Store: append-only event history plus deduplicated open summaries
//!
//! `alert_open_index` maps `(machine_id, metric_key)` to the id of the single
//! open summary for that pair. Recording an alert touches the event tree, the
//! summary tree and the index inside one sled transaction, so two evaluations
//! of the same pair can neither lose an increment nor open two summaries.

use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionResult, Transactional};
use sled::Tree;

use super::{
    abort, keys, StorageError, ALERT_EVENTS_TREE, ALERT_OPEN_INDEX_TREE, ALERT_SUMMARIES_TREE,
};
use crate::types::{AlertEvent, AlertStatus, AlertSummary, NewAlert};

/// Result of recording one alert.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAlert {
    pub event: AlertEvent,
    pub summary: AlertSummary,
}

impl RecordedAlert {
    /// True when this alert opened a fresh summary rather than incrementing one.
    pub fn is_first_occurrence(&self) -> bool {
        self.summary.occurrence_count == 1
    }
}

#[derive(Clone)]
pub struct AlertStore {
    db: sled::Db,
    events: Tree,
    summaries: Tree,
    open_index: Tree,
}

impl AlertStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            db: db.clone(),
            events: db.open_tree(ALERT_EVENTS_TREE)?,
            summaries: db.open_tree(ALERT_SUMMARIES_TREE)?,
            open_index: db.open_tree(ALERT_OPEN_INDEX_TREE)?,
        })
    }

    /// Append an event and fold it into the open summary for its
    /// `(machine_id, metric_key)`, creating one if none is open.
    pub fn record_alert(
        &self,
        alert: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<RecordedAlert, StorageError> {
        let event = alert.into_event(self.db.generate_id()?, now);
        // Only consumed when no summary is open; ids need not be contiguous.
        let fresh_summary_id = self.db.generate_id()?;

        let event_key = keys::id_key(event.id);
        let event_value = serde_json::to_vec(&event)?;
        let index_key = keys::open_alert_key(event.machine_id, &event.metric_key);

        let summary = (&self.events, &self.summaries, &self.open_index).transaction(
            |(events, summaries, open_index)| -> ConflictableTransactionResult<AlertSummary, StorageError> {
                events.insert(event_key.as_slice(), event_value.as_slice())?;

                let summary = match open_index.get(index_key.as_slice())? {
                    Some(raw_id) => {
                        let summary_id =
                            keys::decode_id(ALERT_OPEN_INDEX_TREE, &raw_id).map_err(abort)?;
                        let raw = summaries
                            .get(keys::id_key(summary_id))?
                            .ok_or_else(|| {
                                abort(StorageError::Corrupt {
                                    tree: ALERT_OPEN_INDEX_TREE,
                                    reason: format!(
                                        "open index points at missing summary {summary_id}"
                                    ),
                                })
                            })?;
                        let mut summary: AlertSummary =
                            serde_json::from_slice(&raw).map_err(abort)?;
                        if !summary.is_open() {
                            return Err(abort(StorageError::Corrupt {
                                tree: ALERT_OPEN_INDEX_TREE,
                                reason: format!(
                                    "open index points at acknowledged summary {summary_id}"
                                ),
                            }));
                        }
                        summary.register(&event);
                        summary
                    }
                    None => {
                        open_index
                            .insert(index_key.as_slice(), keys::id_key(fresh_summary_id))?;
                        AlertSummary::open(fresh_summary_id, &event)
                    }
                };

                let value = serde_json::to_vec(&summary).map_err(abort)?;
                summaries.insert(keys::id_key(summary.id), value)?;
                Ok(summary)
            },
        )?;

        tracing::debug!(
            machine_id = event.machine_id,
            metric = %event.metric_key,
            summary_id = summary.id,
            occurrences = summary.occurrence_count,
            "Alert recorded"
        );

        Ok(RecordedAlert { event, summary })
    }

    /// Close an open summary. The next alert for the same metric opens a new one.
    pub fn acknowledge(
        &self,
        summary_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AlertSummary, StorageError> {
        let summary_key = keys::id_key(summary_id);

        let summary = (&self.summaries, &self.open_index).transaction(
            |(summaries, open_index)| -> ConflictableTransactionResult<AlertSummary, StorageError> {
                let raw = summaries.get(summary_key.as_slice())?.ok_or_else(|| {
                    abort(StorageError::NotFound {
                        what: "alert summary",
                        id: summary_id,
                    })
                })?;
                let mut summary: AlertSummary = serde_json::from_slice(&raw).map_err(abort)?;
                if !summary.is_open() {
                    return Err(abort(StorageError::InvalidState(format!(
                        "alert summary {summary_id} is already acknowledged"
                    ))));
                }

                summary.status = AlertStatus::Acknowledged;
                summary.acknowledged_at = Some(now);

                let index_key = keys::open_alert_key(summary.machine_id, &summary.metric_key);
                if let Some(raw_id) = open_index.get(index_key.as_slice())? {
                    if raw_id.as_ref() == summary_key.as_slice() {
                        open_index.remove(index_key.as_slice())?;
                    }
                }

                let value = serde_json::to_vec(&summary).map_err(abort)?;
                summaries.insert(summary_key.as_slice(), value)?;
                Ok(summary)
            },
        )?;

        tracing::info!(
            summary_id,
            machine_id = summary.machine_id,
            metric = %summary.metric_key,
            occurrences = summary.occurrence_count,
            "Alert acknowledged"
        );
        Ok(summary)
    }

    pub fn summary(&self, id: u64) -> Result<Option<AlertSummary>, StorageError> {
        match self.summaries.get(keys::id_key(id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Open summary for a machine/metric pair, if any.
    pub fn open_summary_for(
        &self,
        machine_id: u32,
        metric_key: &str,
    ) -> Result<Option<AlertSummary>, StorageError> {
        match self.open_index.get(keys::open_alert_key(machine_id, metric_key))? {
            Some(raw_id) => self.summary(keys::decode_id(ALERT_OPEN_INDEX_TREE, &raw_id)?),
            None => Ok(None),
        }
    }

    /// Open summaries, newest first, optionally for one machine.
    pub fn open_summaries(&self, machine_id: Option<u32>) -> Result<Vec<AlertSummary>, StorageError> {
        let mut open = Vec::new();
        for item in self.summaries.iter().rev() {
            let (_, raw) = item?;
            let summary: AlertSummary = serde_json::from_slice(&raw)?;
            if summary.is_open() && machine_id.map_or(true, |m| m == summary.machine_id) {
                open.push(summary);
            }
        }
        Ok(open)
    }

    /// Most recent events, newest first.
    pub fn recent_events(
        &self,
        machine_id: Option<u32>,
        limit: usize,
    ) -> Result<Vec<AlertEvent>, StorageError> {
        let mut events = Vec::with_capacity(limit.min(256));
        for item in self.events.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (_, raw) = item?;
            let event: AlertEvent = serde_json::from_slice(&raw)?;
            if machine_id.map_or(true, |m| m == event.machine_id) {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_storage;
    use crate::types::{MetricValue, Severity, ThresholdSnapshot};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn alert(machine_id: u32, metric: &str, reading_id: u64, value: f64) -> NewAlert {
        NewAlert {
            machine_id,
            reading_id,
            metric_key: metric.to_string(),
            value: MetricValue::Number(value),
            severity: Severity::Danger,
            message: format!("value {value} exceeds max 90"),
            threshold: ThresholdSnapshot {
                min: None,
                max: Some(90.0),
            },
        }
    }

    #[test]
    fn test_repeat_alerts_increment_open_summary() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts();

        let first = store.record_alert(alert(1, "ap_luc", 10, 95.0), t0()).unwrap();
        assert!(first.is_first_occurrence());
        assert_eq!(first.summary.first_occurred_at, t0());

        let later = t0() + Duration::seconds(5);
        let second = store.record_alert(alert(1, "ap_luc", 11, 97.0), later).unwrap();
        assert_eq!(second.summary.id, first.summary.id);
        assert_eq!(second.summary.occurrence_count, 2);
        assert_eq!(second.summary.current_value, MetricValue::Number(97.0));
        assert_eq!(second.summary.last_occurred_at, later);
        assert_eq!(second.summary.first_occurred_at, t0());
        assert_eq!(second.summary.last_reading_id, 11);

        assert_eq!(store.event_count(), 2);
        assert_eq!(store.open_summaries(None).unwrap().len(), 1);
    }

    #[test]
    fn test_metrics_and_machines_are_independent() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts();
        store.record_alert(alert(1, "ap_luc", 1, 95.0), t0()).unwrap();
        store.record_alert(alert(1, "nhiet_do", 1, 95.0), t0()).unwrap();
        store.record_alert(alert(2, "ap_luc", 2, 95.0), t0()).unwrap();

        assert_eq!(store.open_summaries(None).unwrap().len(), 3);
        assert_eq!(store.open_summaries(Some(1)).unwrap().len(), 2);
        assert_eq!(store.recent_events(Some(2), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_acknowledge_frees_the_key() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts();
        let first = store.record_alert(alert(1, "ap_luc", 1, 95.0), t0()).unwrap();
        store.record_alert(alert(1, "ap_luc", 2, 96.0), t0()).unwrap();

        let acked = store.acknowledge(first.summary.id, t0()).unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_at, Some(t0()));
        assert!(store.open_summary_for(1, "ap_luc").unwrap().is_none());

        let fresh = store.record_alert(alert(1, "ap_luc", 3, 99.0), t0()).unwrap();
        assert_ne!(fresh.summary.id, first.summary.id);
        assert_eq!(fresh.summary.occurrence_count, 1);

        let old = store.summary(first.summary.id).unwrap().unwrap();
        assert_eq!(old.occurrence_count, 2);
        assert_eq!(old.status, AlertStatus::Acknowledged);
    }

    #[test]
    fn test_acknowledge_errors() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts();
        assert!(matches!(
            store.acknowledge(12345, t0()),
            Err(StorageError::NotFound { .. })
        ));

        let rec = store.record_alert(alert(1, "ap_luc", 1, 95.0), t0()).unwrap();
        store.acknowledge(rec.summary.id, t0()).unwrap();
        assert!(matches!(
            store.acknowledge(rec.summary.id, t0()),
            Err(StorageError::InvalidState(_))
        ));
    }

    #[test]
    fn test_failed_transaction_rolls_back_event() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts();

        // Index entry pointing at a summary that does not exist.
        store
            .open_index
            .insert(keys::open_alert_key(1, "ap_luc"), keys::id_key(999_999))
            .unwrap();

        let result = store.record_alert(alert(1, "ap_luc", 1, 95.0), t0());
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
        assert_eq!(store.event_count(), 0);
        assert!(store.summaries.is_empty());
    }

    #[test]
    fn test_concurrent_recording_counts_every_occurrence() {
        let (_dir, storage) = temp_storage();
        let store = storage.alerts().clone();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .record_alert(alert(1, "ap_luc", t * 100 + i, 95.0), t0())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let open = store.open_summaries(Some(1)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].occurrence_count, 100);
        assert_eq!(store.event_count(), 100);
    }
}
