//! PLC-OEE - extrusion line monitoring
//!
//! Polls PLC watch tables, raises threshold alerts and reports OEE.
//!
//! # Usage
//!
//! ```bash
//! # Poll every active machine in plant_config.toml
//! plc-oee run
//!
//! # Synthetic data, single cycle
//! plc-oee run --simulate --once
//!
//! # Reports
//! plc-oee oee day --machine 1 --date 2024-05-01
//! plc-oee oee month-design --machine 1 --year 2024 --month 5 \
//!     --total-minutes 44640 --unplanned-minutes 1440 --design-capacity 200
//! ```
//!
//! # Environment Variables
//!
//! - `PLC_OEE_CONFIG`: Path to the plant configuration TOML
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use plc_oee::config::{self, validation, PlantConfig};
use plc_oee::pipeline::{
    HttpWatchTableSource, IngestStats, IngestionLoop, SimulatedSource, SnapshotSource,
};
use plc_oee::storage::{ProcessLock, Storage};
use plc_oee::types::{DesignCapacityParams, ProductionEntry};
use plc_oee::OeeCalculator;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plc-oee")]
#[command(about = "PLC monitoring: threshold alerts and OEE for extrusion lines")]
#[command(version)]
struct CliArgs {
    /// Plant configuration file (overrides PLC_OEE_CONFIG and ./plant_config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll machines, store readings and evaluate thresholds
    Run {
        /// Use synthetic data instead of the machines' watch-table endpoints
        #[arg(long)]
        simulate: bool,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Seconds between cycles (default: ingestion.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// OEE reports (JSON on stdout)
    Oee {
        #[command(subcommand)]
        report: OeeReport,
    },

    /// Production entries
    Production {
        #[command(subcommand)]
        action: ProductionAction,
    },

    /// Alert summaries and history
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },

    /// Validate the configuration and print the effective TOML
    CheckConfig,
}

#[derive(Subcommand, Debug)]
enum OeeReport {
    /// One shift
    Shift {
        #[arg(long)]
        machine: u32,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        shift: String,
        /// Runtime in minutes, replacing the counter-derived value
        #[arg(long)]
        runtime: Option<f64>,
    },
    /// One production day
    Day {
        #[arg(long)]
        machine: u32,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Calendar month, mean of daily components
    Month {
        #[arg(long)]
        machine: u32,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
    },
    /// Calendar month against design capacity
    MonthDesign {
        #[arg(long)]
        machine: u32,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Total minutes in the month
        #[arg(long)]
        total_minutes: f64,
        /// Minutes with no production plan, subtracted from the total
        #[arg(long, default_value = "0")]
        unplanned_minutes: f64,
        /// Design capacity in kg/h
        #[arg(long)]
        design_capacity: f64,
    },
    /// Inclusive date range
    Range {
        #[arg(long)]
        machine: u32,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[derive(Subcommand, Debug)]
enum ProductionAction {
    /// Upsert entries from a JSON array
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// List stored entries
    List {
        #[arg(long)]
        machine: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum AlertAction {
    /// Open (unacknowledged) alert summaries
    List {
        #[arg(long)]
        machine: Option<u32>,
    },
    /// Recent alert events, newest first
    Events {
        #[arg(long)]
        machine: Option<u32>,
        #[arg(long, default_value_t = config::defaults::RECENT_EVENTS_LIMIT)]
        limit: usize,
    },
    /// Acknowledge an alert summary
    Ack {
        #[arg(long)]
        id: u64,
    },
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PlantConfig> {
    let config = match path {
        Some(p) => PlantConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display()))?,
        None => PlantConfig::load(),
    };
    for warning in validation::validate_operational_ranges(&config) {
        warn!("{}", warning);
    }
    Ok(config)
}

/// Lock the data directory and open the database inside it.
fn open_storage(config: &PlantConfig) -> Result<(ProcessLock, Storage)> {
    let data_dir = &config.ingestion.data_dir;
    let lock = ProcessLock::acquire(data_dir).context("Failed to lock data directory")?;
    let storage = Storage::open(data_dir.join("db"))
        .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?;
    Ok((lock, storage))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_ingestion(
    storage: &Storage,
    config: &PlantConfig,
    simulate: bool,
    once: bool,
    interval: Option<u64>,
) -> Result<IngestStats> {
    let source: Arc<dyn SnapshotSource> = if simulate {
        Arc::new(SimulatedSource::new(
            config.ingestion.fields.clone(),
            config.oee.throughput_key.clone(),
            config.oee.shifts.clone(),
        ))
    } else {
        Arc::new(
            HttpWatchTableSource::new(Duration::from_secs(config.ingestion.request_timeout_secs))
                .context("Failed to build HTTP client")?,
        )
    };
    info!("📥 Input: {}", source.source_name());

    let mut ingestion = IngestionLoop::new(storage, config, source);
    if let Some(secs) = interval {
        if secs == 0 {
            bail!("--interval must be greater than 0");
        }
        ingestion = ingestion.with_interval(Duration::from_secs(secs));
    }
    if ingestion.machines().is_empty() {
        warn!("No active machines configured, nothing to poll");
    }

    if once {
        let mut stats = IngestStats::default();
        ingestion.run_cycle(&mut stats).await;
        return Ok(stats);
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    Ok(ingestion.run(cancel_token).await)
}

fn run_report(storage: &Storage, config: &PlantConfig, report: OeeReport) -> Result<()> {
    let calculator = OeeCalculator::from_storage(storage, config);
    match report {
        OeeReport::Shift {
            machine,
            date,
            shift,
            runtime,
        } => print_json(&calculator.shift_oee(machine, date, &shift, runtime)?),
        OeeReport::Day { machine, date } => print_json(&calculator.daily_oee(machine, date)?),
        OeeReport::Month {
            machine,
            year,
            month,
        } => print_json(&calculator.monthly_oee(machine, year, month)?),
        OeeReport::MonthDesign {
            machine,
            year,
            month,
            total_minutes,
            unplanned_minutes,
            design_capacity,
        } => {
            let params = DesignCapacityParams {
                total_month_minutes: total_minutes,
                unplanned_minutes,
                design_capacity_kg_h: design_capacity,
            };
            print_json(&calculator.monthly_oee_by_design(machine, year, month, &params)?)
        }
        OeeReport::Range {
            machine,
            start,
            end,
        } => print_json(&calculator.range_oee(machine, start, end)?),
    }
}

fn run_production(storage: &Storage, config: &PlantConfig, action: ProductionAction) -> Result<()> {
    let store = storage.production();
    match action {
        ProductionAction::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<ProductionEntry> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let mut replaced = 0usize;
            for entry in &entries {
                if config.machine(entry.machine_id).is_none() {
                    warn!(machine_id = entry.machine_id, "Entry for unknown machine");
                }
                if config.product(&entry.product_code).is_none() {
                    warn!(product = %entry.product_code, "Entry for unknown product, mass will be 0");
                }
                if store.upsert(entry)?.is_some() {
                    replaced += 1;
                }
            }
            info!(imported = entries.len(), replaced, "Production entries imported");
            Ok(())
        }
        ProductionAction::List { machine } => print_json(&store.list(machine)?),
    }
}

fn run_alerts(storage: &Storage, action: AlertAction) -> Result<()> {
    let alerts = storage.alerts();
    match action {
        AlertAction::List { machine } => print_json(&alerts.open_summaries(machine)?),
        AlertAction::Events { machine, limit } => {
            print_json(&alerts.recent_events(machine, limit)?)
        }
        AlertAction::Ack { id } => {
            let summary = alerts.acknowledge(id, Utc::now())?;
            info!(id, metric = %summary.metric_key, "Alert acknowledged");
            print_json(&summary)
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let plant_config = load_config(args.config.as_ref())?;

    if let Command::CheckConfig = args.command {
        plant_config.validate()?;
        info!(
            plant = %plant_config.plant.name,
            machines = plant_config.machines.len(),
            products = plant_config.products.len(),
            rules = plant_config.thresholds.len(),
            "Configuration valid"
        );
        println!("{}", plant_config.to_toml()?);
        return Ok(());
    }

    config::init(plant_config);
    let plant_config = config::get();
    let (_lock, storage) = open_storage(plant_config)?;

    match args.command {
        Command::Run {
            simulate,
            once,
            interval,
        } => {
            info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            info!("  PLC-OEE - {}", plant_config.plant.name);
            info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            let stats = run_ingestion(&storage, plant_config, simulate, once, interval).await?;
            info!(
                cycles = stats.cycles,
                readings = stats.readings,
                alerts = stats.alerts,
                fetch_failures = stats.fetch_failures,
                "✓ Ingestion finished"
            );
        }
        Command::Oee { report } => run_report(&storage, plant_config, report)?,
        Command::Production { action } => run_production(&storage, plant_config, action)?,
        Command::Alerts { action } => run_alerts(&storage, action)?,
        Command::CheckConfig => {}
    }

    storage.flush()?;
    Ok(())
}
