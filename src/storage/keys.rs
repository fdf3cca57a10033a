//! Big-endian composite keys
//!
//! Layout per tree:
//!
//! | tree | key |
//! |---|---|
//! | readings, alert_events, alert_summaries | `id:u64` |
//! | readings_by_machine | `machine:u32 id:u64` |
//! | readings_by_day | `machine:u32 day:u32 shift 0x00 id:u64` |
//! | production_entries, shift_oee | `machine:u32 day:u32 shift 0x00` |
//! | alert_open_index | `machine:u32 metric_key` |
//!
//! `day` is the proleptic Gregorian day number with the sign bit flipped, so
//! byte order equals date order. Shift labels are UTF-8 and never contain
//! `0x00` or `0xFF`, which makes `0xFF` a safe exclusive upper bound.

use chrono::{Datelike, NaiveDate};

use super::StorageError;

const SHIFT_TERMINATOR: u8 = 0x00;
const UPPER_BOUND: u8 = 0xFF;

pub fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

/// Decode an id stored as a whole key or value.
pub fn decode_id(tree: &'static str, bytes: &[u8]) -> Result<u64, StorageError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt {
        tree,
        reason: format!("expected 8-byte id, found {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(arr))
}

/// Decode the id occupying the last 8 bytes of a composite key.
pub fn trailing_id(tree: &'static str, key: &[u8]) -> Result<u64, StorageError> {
    if key.len() < 8 {
        return Err(StorageError::Corrupt {
            tree,
            reason: format!("key of {} bytes has no trailing id", key.len()),
        });
    }
    decode_id(tree, &key[key.len() - 8..])
}

fn day_bytes(date: NaiveDate) -> [u8; 4] {
    ((date.num_days_from_ce() as u32) ^ 0x8000_0000).to_be_bytes()
}

pub fn machine_prefix(machine_id: u32) -> Vec<u8> {
    machine_id.to_be_bytes().to_vec()
}

pub fn machine_reading_key(machine_id: u32, reading_id: u64) -> Vec<u8> {
    let mut key = machine_prefix(machine_id);
    key.extend_from_slice(&reading_id.to_be_bytes());
    key
}

pub fn day_prefix(machine_id: u32, date: NaiveDate) -> Vec<u8> {
    let mut key = machine_prefix(machine_id);
    key.extend_from_slice(&day_bytes(date));
    key
}

/// `machine day shift 0x00`; the full key for per-shift records and the scan
/// prefix for per-shift readings.
pub fn shift_key(machine_id: u32, date: NaiveDate, shift: &str) -> Vec<u8> {
    let mut key = day_prefix(machine_id, date);
    key.extend_from_slice(shift.as_bytes());
    key.push(SHIFT_TERMINATOR);
    key
}

pub fn day_reading_key(machine_id: u32, date: NaiveDate, shift: &str, reading_id: u64) -> Vec<u8> {
    let mut key = shift_key(machine_id, date, shift);
    key.extend_from_slice(&reading_id.to_be_bytes());
    key
}

/// Half-open key range covering every shift of `start..=end`.
pub fn day_range(machine_id: u32, start: NaiveDate, end: NaiveDate) -> (Vec<u8>, Vec<u8>) {
    let lower = day_prefix(machine_id, start);
    let mut upper = day_prefix(machine_id, end);
    upper.push(UPPER_BOUND);
    (lower, upper)
}

pub fn open_alert_key(machine_id: u32, metric_key: &str) -> Vec<u8> {
    let mut key = machine_prefix(machine_id);
    key.extend_from_slice(metric_key.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_day_keys_sort_chronologically() {
        let a = day_prefix(1, d(2023, 12, 31));
        let b = day_prefix(1, d(2024, 1, 1));
        let c = day_prefix(1, d(2024, 1, 2));
        assert!(a < b && b < c);
        assert!(day_prefix(1, d(2030, 1, 1)) < day_prefix(2, d(2000, 1, 1)));
    }

    #[test]
    fn test_shift_prefix_does_not_match_longer_label() {
        let ca1 = shift_key(1, d(2024, 5, 1), "CA1");
        let ca10 = shift_key(1, d(2024, 5, 1), "CA10");
        assert!(!ca10.starts_with(&ca1));
    }

    #[test]
    fn test_day_range_bounds_all_shifts() {
        let (lower, upper) = day_range(1, d(2024, 5, 1), d(2024, 5, 2));
        let inside = shift_key(1, d(2024, 5, 2), "CA3");
        let outside = shift_key(1, d(2024, 5, 3), "CA1");
        assert!(lower <= inside && inside < upper);
        assert!(outside >= upper);
    }

    #[test]
    fn test_trailing_id() {
        let key = day_reading_key(1, d(2024, 5, 1), "CA1", 42);
        assert_eq!(trailing_id("t", &key).unwrap(), 42);
        assert!(trailing_id("t", &[1, 2]).is_err());
    }
}
