//! Production entries keyed by machine, date and shift

use chrono::{Datelike, NaiveDate};
use sled::Tree;

use super::{keys, StorageError, PRODUCTION_TREE};
use crate::types::ProductionEntry;

#[derive(Clone)]
pub struct ProductionStore {
    entries: Tree,
}

impl ProductionStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            entries: db.open_tree(PRODUCTION_TREE)?,
        })
    }

    /// Insert or replace the entry for its `(machine, date, shift)`.
    ///
    /// Returns the entry it replaced, if any.
    pub fn upsert(&self, entry: &ProductionEntry) -> Result<Option<ProductionEntry>, StorageError> {
        let key = keys::shift_key(entry.machine_id, entry.date, &entry.shift);
        let previous = self.entries.insert(key, serde_json::to_vec(entry)?)?;
        match previous {
            Some(raw) => {
                tracing::info!(
                    machine_id = entry.machine_id,
                    date = %entry.date,
                    shift = %entry.shift,
                    "Production entry replaced"
                );
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub fn get(
        &self,
        machine_id: u32,
        date: NaiveDate,
        shift: &str,
    ) -> Result<Option<ProductionEntry>, StorageError> {
        match self.entries.get(keys::shift_key(machine_id, date, shift))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Entries of `start..=end`, in date order. Empty when `start > end`.
    pub fn for_range(
        &self,
        machine_id: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProductionEntry>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        let (lower, upper) = keys::day_range(machine_id, start, end);
        self.entries
            .range(lower..upper)
            .map(|item| {
                let (_, raw) = item?;
                Ok(serde_json::from_slice(&raw)?)
            })
            .collect()
    }

    pub fn for_day(
        &self,
        machine_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<ProductionEntry>, StorageError> {
        self.for_range(machine_id, date, date)
    }

    /// Entries of a calendar month. An invalid month yields nothing.
    pub fn for_month(
        &self,
        machine_id: u32,
        year: i32,
        month: u32,
    ) -> Result<Vec<ProductionEntry>, StorageError> {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Ok(Vec::new());
        };
        let last = last_day_of_month(first);
        self.for_range(machine_id, first, last)
    }

    /// Every entry, optionally for one machine.
    pub fn list(&self, machine_id: Option<u32>) -> Result<Vec<ProductionEntry>, StorageError> {
        let iter = match machine_id {
            Some(m) => self.entries.scan_prefix(keys::machine_prefix(m)),
            None => self.entries.iter(),
        };
        iter.map(|item| {
            let (_, raw) = item?;
            Ok(serde_json::from_slice(&raw)?)
        })
        .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Last calendar day of the month containing `date`.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}
