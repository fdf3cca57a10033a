//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs use these as their `Default` values.

// ============================================================================
// Config loading
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PLC_OEE_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const CONFIG_FILE_NAME: &str = "plant_config.toml";

// ============================================================================
// Ingestion
// ============================================================================

/// Seconds between crawl cycles.
pub const INGEST_INTERVAL_SECS: u64 = 5;

/// HTTP timeout for one watch-table fetch (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Directory holding the sled database.
pub const DATA_DIR: &str = "./data";

/// Watch-table tag carrying the PLC's shift label.
pub const SHIFT_FIELD: &str = "datalog_data_ca";

/// Watch-table tag carrying the PLC's production date.
pub const DATE_FIELD: &str = "datalog_date";

/// Watch-table tag carrying the cumulative runtime counter (minutes).
pub const RUNTIME_FIELD: &str = "datalog_data_gio_chay_2";

// ============================================================================
// OEE
// ============================================================================

/// Rate metric averaged for Performance (kg/h).
pub const THROUGHPUT_KEY: &str = "nang_suatkg_h";

/// Planned minutes per shift (8 h).
pub const SHIFT_MINUTES: f64 = 480.0;

/// Planned minutes per calendar day for range aggregation (24 h).
pub const DAY_MINUTES: f64 = 1440.0;

/// Shift labels making up one production day.
pub const SHIFTS: [&str; 3] = ["CA1", "CA2", "CA3"];

/// Target productivity used when neither product nor entry define one.
pub const FALLBACK_TARGET_PRODUCTIVITY: f64 = 1.0;

// ============================================================================
// Alerts
// ============================================================================

/// Trailing window for `avg` rules (minutes).
pub const AVG_WINDOW_MINUTES: i64 = 10;

/// Default number of events printed by `alerts events`.
pub const RECENT_EVENTS_LIMIT: usize = 50;

// ============================================================================
// Unit conversion
// ============================================================================

/// Bar length for PPR pipe (m).
pub const PPR_LENGTH_M: f64 = 4.0;

/// Bar length for PSU pipe (m).
pub const PSU_LENGTH_M: f64 = 6.0;

/// Largest PE diameter sold in coils (mm); larger PE pipe ships in bars.
pub const PE_COIL_MAX_DIAMETER_MM: u32 = 90;

/// Bar length for PE pipe above the coil range (m).
pub const PE_BAR_LENGTH_M: f64 = 6.0;

/// Coil length for an unlisted PE diameter in the coil range (m).
pub const PE_DEFAULT_COIL_LENGTH_M: f64 = 100.0;

/// Length for unrecognised materials (m).
pub const FALLBACK_LENGTH_M: f64 = 100.0;

/// PE coil lengths by diameter: `(diameter_mm, length_m)`.
pub const PE_COIL_LENGTHS: [(u32, f64); 9] = [
    (16, 300.0),
    (20, 300.0),
    (25, 300.0),
    (32, 200.0),
    (40, 100.0),
    (50, 100.0),
    (63, 50.0),
    (75, 25.0),
    (90, 25.0),
];

// ============================================================================
// Simulation
// ============================================================================

/// Throughput the simulator centres on (kg/h).
pub const SIM_THROUGHPUT_KG_H: f64 = 180.0;

/// Melt temperature the simulator centres on (°C).
pub const SIM_MELT_TEMP_C: f64 = 205.0;

/// Melt pressure the simulator centres on (bar).
pub const SIM_MELT_PRESSURE_BAR: f64 = 75.0;
