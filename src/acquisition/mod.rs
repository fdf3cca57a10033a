//! Snapshot acquisition
//!
//! Turns the PLC web server's watch-table page into a normalized snapshot.

pub mod watch_table;

pub use watch_table::{normalize_key, parse_value, parse_watch_table, WatchTableError};
