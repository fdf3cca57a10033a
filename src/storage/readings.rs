//! Reading Store: append-only crawl snapshots
//!
//! The primary tree holds each reading under its id. Two index trees map
//! machine → id and machine/day/shift → id; all three are written in one
//! transaction.

use chrono::{DateTime, NaiveDate, Utc};
use sled::transaction::{ConflictableTransactionResult, Transactional};
use sled::Tree;

use super::{keys, StorageError, READINGS_BY_DAY_TREE, READINGS_BY_MACHINE_TREE, READINGS_TREE};
use crate::types::{NewReading, Reading};

#[derive(Clone)]
pub struct ReadingStore {
    db: sled::Db,
    readings: Tree,
    by_machine: Tree,
    by_day: Tree,
}

impl ReadingStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            db: db.clone(),
            readings: db.open_tree(READINGS_TREE)?,
            by_machine: db.open_tree(READINGS_BY_MACHINE_TREE)?,
            by_day: db.open_tree(READINGS_BY_DAY_TREE)?,
        })
    }

    /// Persist a reading, assigning the next id.
    pub fn append(&self, new: NewReading) -> Result<Reading, StorageError> {
        let id = self.db.generate_id()?;
        let reading = new.into_reading(id);
        let value = serde_json::to_vec(&reading)?;

        let primary_key = keys::id_key(id);
        let machine_key = keys::machine_reading_key(reading.machine_id, id);
        let day_key = keys::day_reading_key(
            reading.machine_id,
            reading.production_date,
            &reading.shift_label,
            id,
        );

        (&self.readings, &self.by_machine, &self.by_day).transaction(
            |(readings, by_machine, by_day)| -> ConflictableTransactionResult<(), StorageError> {
                readings.insert(primary_key.as_slice(), value.as_slice())?;
                by_machine.insert(machine_key.as_slice(), &[] as &[u8])?;
                by_day.insert(day_key.as_slice(), &[] as &[u8])?;
                Ok(())
            },
        )?;

        tracing::debug!(
            reading_id = id,
            machine_id = reading.machine_id,
            shift = %reading.shift_label,
            metrics = reading.metrics.len(),
            "Reading stored"
        );
        Ok(reading)
    }

    pub fn get(&self, id: u64) -> Result<Option<Reading>, StorageError> {
        match self.readings.get(keys::id_key(id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn load_indexed(&self, index: &'static str, id: u64) -> Result<Reading, StorageError> {
        self.get(id)?.ok_or_else(|| StorageError::Corrupt {
            tree: index,
            reason: format!("index entry points at missing reading {id}"),
        })
    }

    /// Readings of one production shift, oldest first.
    pub fn for_shift(
        &self,
        machine_id: u32,
        date: NaiveDate,
        shift: &str,
    ) -> Result<Vec<Reading>, StorageError> {
        self.by_day
            .scan_prefix(keys::shift_key(machine_id, date, shift))
            .map(|item| {
                let (key, _) = item?;
                let id = keys::trailing_id(READINGS_BY_DAY_TREE, &key)?;
                self.load_indexed(READINGS_BY_DAY_TREE, id)
            })
            .collect()
    }

    /// Most recent reading of a machine.
    pub fn latest(&self, machine_id: u32) -> Result<Option<Reading>, StorageError> {
        match self
            .by_machine
            .scan_prefix(keys::machine_prefix(machine_id))
            .next_back()
        {
            Some(item) => {
                let (key, _) = item?;
                let id = keys::trailing_id(READINGS_BY_MACHINE_TREE, &key)?;
                Ok(Some(self.load_indexed(READINGS_BY_MACHINE_TREE, id)?))
            }
            None => Ok(None),
        }
    }

    /// Readings of a machine recorded at or after `since`, oldest first.
    ///
    /// Scans backwards from the newest id and stops at the first reading
    /// older than `since`.
    pub fn recorded_since(
        &self,
        machine_id: u32,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        let mut window = Vec::new();
        for item in self
            .by_machine
            .scan_prefix(keys::machine_prefix(machine_id))
            .rev()
        {
            let (key, _) = item?;
            let id = keys::trailing_id(READINGS_BY_MACHINE_TREE, &key)?;
            let reading = self.load_indexed(READINGS_BY_MACHINE_TREE, id)?;
            if reading.timestamp < since {
                break;
            }
            window.push(reading);
        }
        window.reverse();
        Ok(window)
    }

    pub fn count(&self) -> usize {
        self.readings.len()
    }

    /// Remove a reading from the primary tree only, leaving its index
    /// entries dangling.
    #[cfg(test)]
    pub(crate) fn corrupt_primary(&self, id: u64) {
        self.readings.remove(keys::id_key(id)).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_storage;
    use crate::types::MetricValue;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn new_reading(machine_id: u32, shift: &str, minute: i64, runtime: f64) -> NewReading {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let mut metrics = BTreeMap::new();
        metrics.insert("nang_suatkg_h".to_string(), MetricValue::Number(50.0));
        NewReading {
            machine_id,
            timestamp: base + Duration::minutes(minute),
            production_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            shift_label: shift.to_string(),
            runtime_minutes: Some(runtime),
            metrics,
        }
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let (_dir, storage) = temp_storage();
        let store = storage.readings();
        let a = store.append(new_reading(1, "CA1", 0, 10.0)).unwrap();
        let b = store.append(new_reading(1, "CA1", 1, 11.0)).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.get(a.id).unwrap(), Some(a));
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_for_shift_filters_machine_and_shift() {
        let (_dir, storage) = temp_storage();
        let store = storage.readings();
        store.append(new_reading(1, "CA1", 0, 10.0)).unwrap();
        store.append(new_reading(2, "CA1", 0, 99.0)).unwrap();
        store.append(new_reading(1, "CA2", 500, 3.0)).unwrap();
        let last = store.append(new_reading(1, "CA1", 5, 15.0)).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let shift = store.for_shift(1, date, "CA1").unwrap();
        assert_eq!(shift.len(), 2);
        assert!(shift[0].id < shift[1].id);
        assert_eq!(shift[1], last);
        assert!(store.for_shift(1, date, "CA3").unwrap().is_empty());
    }

    #[test]
    fn test_recorded_since_stops_at_window_edge() {
        let (_dir, storage) = temp_storage();
        let store = storage.readings();
        for minute in [0, 3, 8, 12] {
            store.append(new_reading(1, "CA1", minute, 0.0)).unwrap();
        }
        store.append(new_reading(2, "CA1", 13, 0.0)).unwrap();

        let since = Utc.with_ymd_and_hms(2024, 5, 1, 6, 3, 0).unwrap();
        let window = store.recorded_since(1, since).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].timestamp, since);
        assert_eq!(store.latest(1).unwrap().unwrap().timestamp, since + Duration::minutes(9));
    }

    #[test]
    fn test_dangling_index_is_reported() {
        let (_dir, storage) = temp_storage();
        let store = storage.readings();
        let r = store.append(new_reading(1, "CA1", 0, 1.0)).unwrap();
        store.corrupt_primary(r.id);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(matches!(
            store.for_shift(1, date, "CA1"),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
