//! Plant Configuration - machine catalog, products, rules and runtime tuning
//!
//! Every section has defaults matching the production deployment, so an empty
//! file (or no file at all) yields a runnable, if empty, configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::{Machine, Product, StandardLengthOverride, ThresholdRule};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a plant deployment.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$PLC_OEE_CONFIG` env var
/// 2. `./plant_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default)]
    pub plant: PlantInfo,

    /// Crawl loop tuning and snapshot field mapping
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// OEE planned-time conventions
    #[serde(default)]
    pub oee: OeeConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub machines: Vec<Machine>,

    #[serde(default)]
    pub products: Vec<Product>,

    /// Explicit standard lengths, checked before the material rules
    #[serde(default)]
    pub standard_lengths: Vec<StandardLengthOverride>,

    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
}

impl PlantConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PLC_OEE_CONFIG` environment variable
    /// 2. `./plant_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from PLC_OEE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from PLC_OEE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "PLC_OEE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(plant = %config.plant.name, "Loaded plant config from ./plant_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./plant_config.toml, using defaults");
                }
            }
        }

        info!("No plant_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings; validation failures are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Toml(e) => ConfigError::Parse(path.to_path_buf(), e),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn machine(&self, id: u32) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    pub fn active_machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.active)
    }

    pub fn product(&self, code: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }

    /// Validate every section, collecting all problems.
    ///
    /// Rules:
    /// - Durations and planned minutes must be positive and finite
    /// - Shift list must be non-empty without duplicates
    /// - Machine ids, product codes, rule ids must be unique
    /// - Threshold rules must satisfy their kind's parameter checks and
    ///   reference a configured machine
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.ingestion.interval_secs == 0 {
            errors.push("ingestion.interval_secs must be > 0".to_string());
        }
        if self.ingestion.request_timeout_secs == 0 {
            errors.push("ingestion.request_timeout_secs must be > 0".to_string());
        }
        if self.alerts.avg_window_minutes <= 0 {
            errors.push(format!(
                "alerts.avg_window_minutes must be > 0 (got {})",
                self.alerts.avg_window_minutes
            ));
        }
        Self::check_positive(self.oee.shift_minutes, "oee.shift_minutes", &mut errors);
        Self::check_positive(self.oee.day_minutes, "oee.day_minutes", &mut errors);
        if self.oee.throughput_key.trim().is_empty() {
            errors.push("oee.throughput_key must not be empty".to_string());
        }
        if self.oee.shifts.is_empty() {
            errors.push("oee.shifts must list at least one shift".to_string());
        }
        Self::check_unique(
            self.oee.shifts.iter().map(String::as_str),
            "oee.shifts",
            &mut errors,
        );

        for field in [
            ("ingestion.fields.shift", &self.ingestion.fields.shift),
            ("ingestion.fields.date", &self.ingestion.fields.date),
            ("ingestion.fields.runtime_minutes", &self.ingestion.fields.runtime_minutes),
        ] {
            if field.1.trim().is_empty() {
                errors.push(format!("{} must not be empty", field.0));
            }
        }

        let mut machine_ids = HashSet::new();
        for m in &self.machines {
            if !machine_ids.insert(m.id) {
                errors.push(format!("machines: duplicate id {}", m.id));
            }
        }

        Self::check_unique(
            self.products.iter().map(|p| p.code.as_str()),
            "products.code",
            &mut errors,
        );
        for p in &self.products {
            for (name, value) in [
                ("weight_per_meter_g", p.weight_per_meter_g),
                ("min_productivity", p.min_productivity),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        errors.push(format!(
                            "products[{}].{name} must be a non-negative number (got {v})",
                            p.code
                        ));
                    }
                }
            }
        }

        for s in &self.standard_lengths {
            if !s.length_m.is_finite() || s.length_m < 0.0 {
                errors.push(format!(
                    "standard_lengths[{}]: length_m must be a non-negative number (got {})",
                    s.diameter_mm, s.length_m
                ));
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.thresholds {
            if !rule_ids.insert(rule.id) {
                errors.push(format!("thresholds: duplicate rule id {}", rule.id));
            }
            if let Err(e) = rule.validate() {
                errors.push(e.to_string());
            }
            if !machine_ids.contains(&rule.machine_id) {
                errors.push(format!(
                    "rule {}: unknown machine_id {}",
                    rule.id, rule.machine_id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be a positive number (got {value})"));
        }
    }

    fn check_unique<'a>(
        values: impl Iterator<Item = &'a str>,
        name: &str,
        errors: &mut Vec<String>,
    ) {
        let mut seen = HashSet::new();
        for v in values {
            if !seen.insert(v) {
                errors.push(format!("{name}: duplicate value '{v}'"));
            }
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n{}", format_list(.0))]
    Validation(Vec<String>),
}

fn format_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Sections
// ============================================================================

/// Identification metadata; appears in logs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantInfo {
    pub name: String,
    pub site: String,
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: "Unnamed plant".to_string(),
            site: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub fields: FieldMapping,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::INGEST_INTERVAL_SECS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            data_dir: PathBuf::from(defaults::DATA_DIR),
            fields: FieldMapping::default(),
        }
    }
}

/// Snapshot keys promoted to first-class `Reading` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub shift: String,
    pub date: String,
    pub runtime_minutes: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            shift: defaults::SHIFT_FIELD.to_string(),
            date: defaults::DATE_FIELD.to_string(),
            runtime_minutes: defaults::RUNTIME_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OeeConfig {
    pub throughput_key: String,
    pub shift_minutes: f64,
    pub day_minutes: f64,
    pub shifts: Vec<String>,
}

impl Default for OeeConfig {
    fn default() -> Self {
        Self {
            throughput_key: defaults::THROUGHPUT_KEY.to_string(),
            shift_minutes: defaults::SHIFT_MINUTES,
            day_minutes: defaults::DAY_MINUTES,
            shifts: defaults::SHIFTS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub avg_window_minutes: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            avg_window_minutes: defaults::AVG_WINDOW_MINUTES,
        }
    }
}
