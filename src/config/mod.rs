//! Plant Configuration Module
//!
//! Machine catalog, products, threshold rules and runtime tuning, loaded from
//! a TOML file.
//!
//! ## Loading Order
//!
//! 1. `PLC_OEE_CONFIG` environment variable (path to TOML file)
//! 2. `plant_config.toml` in the current working directory
//! 3. Built-in defaults (no machines, no rules)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(PlantConfig::load());
//!
//! // Anywhere in the binary:
//! let interval = config::get().ingestion.interval_secs;
//! ```
//!
//! Library components take `&PlantConfig` (or the pieces they need)
//! explicitly; only the binary reads the global.

mod plant_config;
pub mod defaults;
pub mod validation;

pub use plant_config::*;

use std::sync::OnceLock;

static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration. Later calls are ignored.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global plant configuration.
///
/// Panics if `init()` has not been called; that is a startup bug.
pub fn get() -> &'static PlantConfig {
    PLANT_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}
