//! Shift OEE results saved at shift change

use chrono::NaiveDate;
use sled::Tree;

use super::{keys, StorageError, SHIFT_OEE_TREE};
use crate::types::ShiftOee;

#[derive(Clone)]
pub struct ShiftResultStore {
    results: Tree,
}

impl ShiftResultStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            results: db.open_tree(SHIFT_OEE_TREE)?,
        })
    }

    /// Save a shift result, replacing an earlier one for the same shift.
    pub fn save(&self, result: &ShiftOee) -> Result<(), StorageError> {
        let key = keys::shift_key(result.machine_id, result.date, &result.shift);
        self.results.insert(key, serde_json::to_vec(result)?)?;
        Ok(())
    }

    pub fn get(
        &self,
        machine_id: u32,
        date: NaiveDate,
        shift: &str,
    ) -> Result<Option<ShiftOee>, StorageError> {
        match self.results.get(keys::shift_key(machine_id, date, shift))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Saved results of `start..=end`, in date order.
    pub fn for_range(
        &self,
        machine_id: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ShiftOee>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        let (lower, upper) = keys::day_range(machine_id, start, end);
        self.results
            .range(lower..upper)
            .map(|item| {
                let (_, raw) = item?;
                Ok(serde_json::from_slice(&raw)?)
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_storage;
    use crate::types::OeeScore;

    #[test]
    fn test_save_and_query() {
        let (_dir, storage) = temp_storage();
        let store = storage.shift_results();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let mut result = ShiftOee::empty(1, date, "CA1");
        store.save(&result).unwrap();
        result.score = OeeScore::from_components(0.5, 0.5, 0.9);
        store.save(&result).unwrap();
        store.save(&ShiftOee::empty(1, date, "CA2")).unwrap();

        assert_eq!(store.count(), 2);
        let saved = store.get(1, date, "CA1").unwrap().unwrap();
        assert!((saved.score.oee - 0.225).abs() < 1e-12);
        assert_eq!(store.for_range(1, date, date).unwrap().len(), 2);
    }
}
