//! Snapshot source abstraction for machine polling.
//!
//! The ingestion loop asks a [`SnapshotSource`] for the current state of one
//! machine per cycle. Implementations:
//!
//! - [`HttpWatchTableSource`]: GET the machine's watch-table page and parse it
//! - [`SimulatedSource`]: synthetic extrusion data for demos and tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::acquisition::{parse_watch_table, WatchTableError};
use crate::config::{defaults, FieldMapping};
use crate::types::{Machine, MetricValue, Snapshot};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Machine {0} has no endpoint configured")]
    NoEndpoint(u32),

    #[error("Fetch from {endpoint} failed: {source}")]
    Fetch {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Watch table parse failed: {0}")]
    Parse(#[from] WatchTableError),
}

/// Where machine snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current state of `machine`.
    async fn fetch(&self, machine: &Machine) -> Result<Snapshot, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// HTTP watch-table source
// ============================================================================

pub struct HttpWatchTableSource {
    http: reqwest::Client,
}

impl HttpWatchTableSource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SnapshotSource for HttpWatchTableSource {
    async fn fetch(&self, machine: &Machine) -> Result<Snapshot, SourceError> {
        if machine.endpoint.trim().is_empty() {
            return Err(SourceError::NoEndpoint(machine.id));
        }
        let endpoint = machine.endpoint.clone();

        let resp = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| SourceError::Fetch {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status { endpoint, status });
        }

        let body = resp.text().await.map_err(|source| SourceError::Fetch {
            endpoint: endpoint.clone(),
            source,
        })?;
        Ok(parse_watch_table(&body)?)
    }

    fn source_name(&self) -> &str {
        "watch-table"
    }
}

// ============================================================================
// Simulated source
// ============================================================================

/// Synthetic extrusion line: noisy throughput and melt conditions, a runtime
/// counter that restarts with each shift, and a shift label from the clock.
///
/// Shifts follow the usual three-crew pattern: CA1 06-14, CA2 14-22, CA3
/// 22-06 (attributed to the day it started).
pub struct SimulatedSource {
    fields: FieldMapping,
    throughput_key: String,
    shifts: Vec<String>,
    rng: Mutex<StdRng>,
    /// Per machine: (shift label, counter minutes, last sample time)
    counters: Mutex<HashMap<u32, (String, f64, DateTime<Utc>)>>,
}

impl SimulatedSource {
    pub fn new(fields: FieldMapping, throughput_key: String, shifts: Vec<String>) -> Self {
        Self::with_rng(fields, throughput_key, shifts, StdRng::from_entropy())
    }

    pub fn seeded(
        fields: FieldMapping,
        throughput_key: String,
        shifts: Vec<String>,
        seed: u64,
    ) -> Self {
        Self::with_rng(fields, throughput_key, shifts, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        fields: FieldMapping,
        throughput_key: String,
        shifts: Vec<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            fields,
            throughput_key,
            shifts,
            rng: Mutex::new(rng),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Shift label and production date for an instant.
    fn shift_at(&self, now: DateTime<Utc>) -> (String, String) {
        let hour = now.hour();
        let (index, date) = match hour {
            6..=13 => (0, now.date_naive()),
            14..=21 => (1, now.date_naive()),
            22..=23 => (2, now.date_naive()),
            _ => (
                2,
                now.date_naive()
                    .checked_sub_days(Days::new(1))
                    .unwrap_or(now.date_naive()),
            ),
        };
        let label = self
            .shifts
            .get(index)
            .or_else(|| self.shifts.last())
            .cloned()
            .unwrap_or_default();
        (label, date.format("%Y-%m-%d").to_string())
    }

    /// Snapshot for `machine` as of `now`.
    pub fn sample_at(&self, machine: &Machine, now: DateTime<Utc>) -> Snapshot {
        let (shift, date) = self.shift_at(now);
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut jitter = |mean: f64, sd: f64| {
            Normal::new(mean, sd).map_or(mean, |d| d.sample(&mut *rng))
        };

        let throughput = jitter(defaults::SIM_THROUGHPUT_KG_H, 8.0).max(0.0);
        let melt_temp = jitter(defaults::SIM_MELT_TEMP_C, 2.0);
        let melt_pressure = jitter(defaults::SIM_MELT_PRESSURE_BAR, 3.0);
        let running = throughput > 0.0;

        let runtime = {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            let entry = counters
                .entry(machine.id)
                .or_insert_with(|| (shift.clone(), 0.0, now));
            if entry.0 != shift {
                *entry = (shift.clone(), 0.0, now);
            } else if running {
                let elapsed = (now - entry.2).num_milliseconds().max(0) as f64 / 60_000.0;
                entry.1 += elapsed;
            }
            entry.2 = now;
            (entry.1 * 100.0).round() / 100.0
        };

        Snapshot::new()
            .with(&self.fields.shift, MetricValue::Text(shift))
            .with(&self.fields.date, MetricValue::Text(date))
            .with(&self.fields.runtime_minutes, runtime)
            .with(&self.throughput_key, (throughput * 100.0).round() / 100.0)
            .with("nhiet_do_nhua", (melt_temp * 10.0).round() / 10.0)
            .with("ap_suat_nhua", (melt_pressure * 10.0).round() / 10.0)
            .with("motor_run", running)
    }
}

#[async_trait]
impl SnapshotSource for SimulatedSource {
    async fn fetch(&self, machine: &Machine) -> Result<Snapshot, SourceError> {
        Ok(self.sample_at(machine, Utc::now()))
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}
