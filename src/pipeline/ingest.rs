//! Ingestion loop: poll → persist → shift-change check → thresholds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::source::SnapshotSource;
use crate::config::{FieldMapping, PlantConfig};
use crate::oee::OeeCalculator;
use crate::storage::{ReadingStore, ShiftResultStore, Storage, StorageError};
use crate::thresholds::{ThresholdEvaluator, ThresholdRegistry};
use crate::types::{display_number, AlertEvent, Machine, MetricValue, NewReading, Reading, Snapshot};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot contains no values")]
    Empty,

    #[error("snapshot is missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' has unparseable date '{value}'")]
    InvalidDate { field: String, value: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Build a reading from a snapshot using the configured field names.
///
/// A missing date falls back to the UTC date of `now`. A missing or empty
/// shift label is an error since every rollup is keyed by it.
pub fn reading_from_snapshot(
    machine_id: u32,
    snapshot: &Snapshot,
    fields: &FieldMapping,
    now: DateTime<Utc>,
) -> Result<NewReading, SnapshotError> {
    if snapshot.is_empty() {
        return Err(SnapshotError::Empty);
    }

    let shift_label = match snapshot.get(&fields.shift) {
        Some(MetricValue::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(MetricValue::Number(x)) => display_number(*x),
        _ => return Err(SnapshotError::MissingField(fields.shift.clone())),
    };

    let production_date = match snapshot.get(&fields.date) {
        None | Some(MetricValue::Null) => now.date_naive(),
        Some(value) => {
            let text = value.to_string();
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
                SnapshotError::InvalidDate {
                    field: fields.date.clone(),
                    value: text.clone(),
                }
            })?
        }
    };

    let runtime_minutes = snapshot
        .get(&fields.runtime_minutes)
        .and_then(MetricValue::as_f64);

    Ok(NewReading {
        machine_id,
        timestamp: now,
        production_date,
        shift_label,
        runtime_minutes,
        metrics: snapshot.values.clone(),
    })
}

/// Outcome of one ingested snapshot.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub reading: Reading,
    pub alerts: Vec<AlertEvent>,
    /// `(date, shift)` whose OEE was finalized by this reading
    pub closed_shift: Option<(NaiveDate, String)>,
}

/// Counters for a run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub cycles: u64,
    pub readings: u64,
    pub alerts: u64,
    pub shifts_closed: u64,
    pub fetch_failures: u64,
    pub rejected_snapshots: u64,
}

pub struct IngestionLoop {
    source: Arc<dyn SnapshotSource>,
    machines: Vec<Machine>,
    fields: FieldMapping,
    interval: Duration,
    readings: ReadingStore,
    shift_results: ShiftResultStore,
    evaluator: ThresholdEvaluator,
    calculator: OeeCalculator,
}

impl IngestionLoop {
    pub fn new(storage: &Storage, config: &PlantConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let registry = Arc::new(ThresholdRegistry::from_rules(config.thresholds.clone()));
        let evaluator = ThresholdEvaluator::new(
            registry,
            storage.readings().clone(),
            storage.alerts().clone(),
            chrono::Duration::minutes(config.alerts.avg_window_minutes),
        );
        Self {
            source,
            machines: config.active_machines().cloned().collect(),
            fields: config.ingestion.fields.clone(),
            interval: Duration::from_secs(config.ingestion.interval_secs),
            readings: storage.readings().clone(),
            shift_results: storage.shift_results().clone(),
            evaluator,
            calculator: OeeCalculator::from_storage(storage, config),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Poll until cancelled. Returns the accumulated counters.
    pub async fn run(&self, cancel: CancellationToken) -> IngestStats {
        let mut stats = IngestStats::default();
        info!(
            source = self.source.source_name(),
            machines = self.machines.len(),
            interval_secs = self.interval.as_secs(),
            "Ingestion started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                () = self.run_cycle(&mut stats) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            cycles = stats.cycles,
            readings = stats.readings,
            alerts = stats.alerts,
            shifts_closed = stats.shifts_closed,
            "Ingestion stopped"
        );
        stats
    }

    /// One pass over every active machine. Failures are logged per machine
    /// and never abort the pass.
    pub async fn run_cycle(&self, stats: &mut IngestStats) {
        stats.cycles += 1;
        for machine in &self.machines {
            let snapshot = match self.source.fetch(machine).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(machine_id = machine.id, error = %e, "Fetch failed, machine skipped");
                    stats.fetch_failures += 1;
                    continue;
                }
            };

            match self.ingest_snapshot(machine.id, &snapshot, Utc::now()) {
                Ok(outcome) => {
                    stats.readings += 1;
                    stats.alerts += outcome.alerts.len() as u64;
                    if outcome.closed_shift.is_some() {
                        stats.shifts_closed += 1;
                    }
                }
                Err(IngestError::Snapshot(e)) => {
                    warn!(machine_id = machine.id, error = %e, "Snapshot rejected");
                    stats.rejected_snapshots += 1;
                }
                Err(IngestError::Storage(e)) => {
                    error!(machine_id = machine.id, error = %e, "Failed to persist reading");
                }
            }
        }
    }

    /// Persist one snapshot, close the previous shift if it changed, then
    /// evaluate threshold rules against the new reading.
    pub fn ingest_snapshot(
        &self,
        machine_id: u32,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let new = reading_from_snapshot(machine_id, snapshot, &self.fields, now)?;
        let previous = self.readings.latest(machine_id)?;
        let reading = self.readings.append(new)?;
        debug!(
            machine_id,
            reading_id = reading.id,
            shift = %reading.shift_label,
            date = %reading.production_date,
            "Reading stored"
        );

        let closed_shift = match previous {
            Some(prev)
                if prev.shift_label != reading.shift_label
                    || prev.production_date != reading.production_date =>
            {
                info!(
                    machine_id,
                    from = %prev.shift_label,
                    to = %reading.shift_label,
                    "Shift change detected"
                );
                self.close_shift(machine_id, prev.production_date, &prev.shift_label)
            }
            Some(_) => None,
            None => {
                debug!(machine_id, "No previous reading, shift change check skipped");
                None
            }
        };

        let alerts = self.evaluator.evaluate(machine_id, &reading, now);
        Ok(IngestOutcome {
            reading,
            alerts,
            closed_shift,
        })
    }

    fn close_shift(&self, machine_id: u32, date: NaiveDate, shift: &str) -> Option<(NaiveDate, String)> {
        let result = match self.calculator.shift_oee(machine_id, date, shift, None) {
            Ok(r) => r,
            Err(e) => {
                error!(machine_id, %date, shift, error = %e, "Shift OEE calculation failed");
                return None;
            }
        };
        info!(
            machine_id,
            %date,
            shift,
            availability = result.score.availability,
            performance = result.score.performance,
            quality = result.score.quality,
            oee = result.score.oee,
            "Shift OEE finalized"
        );
        if let Err(e) = self.shift_results.save(&result) {
            error!(machine_id, %date, shift, error = %e, "Failed to save shift OEE");
            return None;
        }
        Some((date, shift.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_reading_from_snapshot_promotes_fields() {
        let fields = FieldMapping::default();
        let snap = Snapshot::new()
            .with(&fields.shift, "CA2")
            .with(&fields.date, "2024-04-30")
            .with(&fields.runtime_minutes, 125.5)
            .with("nang_suatkg_h", 180.0);
        let r = reading_from_snapshot(3, &snap, &fields, now()).unwrap();
        assert_eq!(r.machine_id, 3);
        assert_eq!(r.shift_label, "CA2");
        assert_eq!(r.production_date, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
        assert_eq!(r.runtime_minutes, Some(125.5));
        assert_eq!(r.metrics.len(), 4);
    }

    #[test]
    fn test_missing_date_uses_today() {
        let fields = FieldMapping::default();
        let snap = Snapshot::new().with(&fields.shift, "CA1");
        let r = reading_from_snapshot(1, &snap, &fields, now()).unwrap();
        assert_eq!(r.production_date, now().date_naive());
        assert_eq!(r.runtime_minutes, None);
    }

    #[test]
    fn test_snapshot_rejections() {
        let fields = FieldMapping::default();
        assert!(matches!(
            reading_from_snapshot(1, &Snapshot::new(), &fields, now()),
            Err(SnapshotError::Empty)
        ));
        assert!(matches!(
            reading_from_snapshot(1, &Snapshot::new().with("x", 1.0), &fields, now()),
            Err(SnapshotError::MissingField(f)) if f == fields.shift
        ));
        let bad_date = Snapshot::new()
            .with(&fields.shift, "CA1")
            .with(&fields.date, "01/05/2024");
        assert!(matches!(
            reading_from_snapshot(1, &bad_date, &fields, now()),
            Err(SnapshotError::InvalidDate { .. })
        ));
    }
}
