//! OEE Calculator
//!
//! All components are clamped to `[0, 1]` before multiplying and every
//! division guards against a non-positive denominator by yielding 0.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::{OeeError, UnitConverter};
use crate::config::{defaults, OeeConfig, PlantConfig};
use crate::storage::production::last_day_of_month;
use crate::storage::{ProductionStore, ReadingStore, Storage};
use crate::types::{
    safe_ratio, DailyDetails, DailyOee, DayScore, DesignCapacityDetails, DesignCapacityOee,
    DesignCapacityParams, MonthlyDetails, MonthlyOee, OeeScore, ProductionEntry, RangeOee,
    RangeSummary, Reading, ShiftDetails, ShiftOee,
};

/// Runtime from a cumulative counter, tolerating counter resets.
///
/// The counter normally only grows during a shift, so the last value is the
/// runtime. When it drops, the run before the drop is a finished segment:
/// runtime is the sum of each segment's last value. Returns
/// `(runtime_minutes, resets)`.
pub fn runtime_from_counter(readings: &[Reading]) -> (f64, usize) {
    let mut completed = 0.0;
    let mut resets = 0;
    let mut last: Option<f64> = None;
    for value in readings
        .iter()
        .filter_map(|r| r.runtime_minutes)
        .filter(|v| v.is_finite())
    {
        if let Some(prev) = last {
            if value < prev {
                completed += prev;
                resets += 1;
            }
        }
        last = Some(value);
    }
    (completed + last.unwrap_or(0.0), resets)
}

/// Mean of the numeric values of `key`; 0 when there are none.
fn mean_metric(readings: &[Reading], key: &str) -> f64 {
    let (sum, n) = readings
        .iter()
        .filter_map(|r| r.metric_f64(key))
        .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub struct OeeCalculator {
    readings: ReadingStore,
    production: ProductionStore,
    converter: UnitConverter,
    settings: OeeConfig,
}

impl OeeCalculator {
    pub fn new(
        readings: ReadingStore,
        production: ProductionStore,
        converter: UnitConverter,
        settings: OeeConfig,
    ) -> Self {
        Self {
            readings,
            production,
            converter,
            settings,
        }
    }

    /// Calculator over the plant's stores, catalogue and OEE settings.
    pub fn from_storage(storage: &Storage, config: &PlantConfig) -> Self {
        Self::new(
            storage.readings().clone(),
            storage.production().clone(),
            UnitConverter::new(&config.products, &config.standard_lengths),
            config.oee.clone(),
        )
    }

    /// Target productivity of one entry: product minimum, then the entry's
    /// own target, then 1.
    fn entry_target(&self, entry: &ProductionEntry) -> f64 {
        self.converter
            .product(&entry.product_code)
            .and_then(|p| p.min_productivity)
            .filter(|t| *t > 0.0)
            .or_else(|| entry.target_productivity.filter(|t| *t > 0.0))
            .unwrap_or(defaults::FALLBACK_TARGET_PRODUCTIVITY)
    }

    /// Output-quantity-weighted mean target over entries sharing a period.
    /// Plain mean if no entry reports output.
    pub fn target_productivity(&self, entries: &[ProductionEntry]) -> f64 {
        if entries.is_empty() {
            return defaults::FALLBACK_TARGET_PRODUCTIVITY;
        }
        let total_quantity: f64 = entries.iter().map(|e| e.output_quantity.max(0.0)).sum();
        if total_quantity > 0.0 {
            entries
                .iter()
                .map(|e| self.entry_target(e) * e.output_quantity.max(0.0))
                .sum::<f64>()
                / total_quantity
        } else {
            entries.iter().map(|e| self.entry_target(e)).sum::<f64>() / entries.len() as f64
        }
    }

    // ------------------------------------------------------------------------
    // Shift
    // ------------------------------------------------------------------------

    /// OEE of one shift. `runtime_override` replaces the counter-derived
    /// runtime (minutes).
    ///
    /// No production entry or no readings yields an all-zero result.
    pub fn shift_oee(
        &self,
        machine_id: u32,
        date: NaiveDate,
        shift: &str,
        runtime_override: Option<f64>,
    ) -> Result<ShiftOee, OeeError> {
        let readings = self.readings.for_shift(machine_id, date, shift)?;
        let Some(entry) = self.production.get(machine_id, date, shift)? else {
            debug!(machine_id, %date, shift, "No production entry for shift");
            return Ok(ShiftOee::empty(machine_id, date, shift));
        };
        if readings.is_empty() {
            debug!(machine_id, %date, shift, "No readings for shift");
            return Ok(ShiftOee::empty(machine_id, date, shift));
        }

        let (counter_runtime, resets) = runtime_from_counter(&readings);
        if resets > 0 {
            warn!(
                machine_id,
                %date,
                shift,
                resets,
                runtime = counter_runtime,
                "Runtime counter went backwards within shift, summing segments"
            );
        }
        let run_time_minutes = runtime_override.unwrap_or(counter_runtime);
        let availability = safe_ratio(run_time_minutes, self.settings.shift_minutes);

        let actual_productivity = mean_metric(&readings, &self.settings.throughput_key);
        let target_productivity = self.target_productivity(std::slice::from_ref(&entry));
        let performance = safe_ratio(actual_productivity, target_productivity);

        let good_products_kg = self
            .converter
            .to_kilograms(&entry.product_code, entry.good_quantity);
        let defect_products_kg = entry.defect_weight_kg.max(0.0);
        let total_products_kg = good_products_kg + defect_products_kg;
        let quality = safe_ratio(good_products_kg, total_products_kg);

        Ok(ShiftOee {
            machine_id,
            date,
            shift: shift.to_string(),
            score: OeeScore::from_components(availability, performance, quality),
            details: Some(ShiftDetails {
                run_time_minutes,
                planned_minutes: self.settings.shift_minutes,
                actual_productivity,
                target_productivity,
                good_products: entry.good_quantity,
                good_products_kg,
                defect_products_kg,
                total_products_kg,
                reading_count: readings.len(),
                runtime_counter_resets: resets,
            }),
        })
    }

    // ------------------------------------------------------------------------
    // Day
    // ------------------------------------------------------------------------

    /// OEE of one production day across the configured shifts.
    ///
    /// Only shifts with OEE > 0 count, so a shift that produced but scored 0
    /// on some component is excluded along with shifts without data.
    pub fn daily_oee(&self, machine_id: u32, date: NaiveDate) -> Result<DailyOee, OeeError> {
        let shifts = self
            .settings
            .shifts
            .iter()
            .map(|s| self.shift_oee(machine_id, date, s, None))
            .collect::<Result<Vec<_>, _>>()?;

        let mut details = DailyDetails::default();
        let mut weighted_performance = 0.0;
        let mut weighted_actual = 0.0;
        let mut weighted_target = 0.0;

        for shift in shifts.iter().filter(|s| s.score.is_valid()) {
            let Some(d) = &shift.details else { continue };
            details.valid_shifts += 1;
            details.total_run_time_minutes += d.run_time_minutes;
            details.total_good_products_kg += d.good_products_kg;
            details.total_defect_products_kg += d.defect_products_kg;
            weighted_performance += shift.score.performance * d.run_time_minutes;
            weighted_actual += d.actual_productivity * d.run_time_minutes;
            weighted_target += d.target_productivity * d.run_time_minutes;
        }

        let score = if details.valid_shifts == 0 {
            OeeScore::zero()
        } else {
            let runtime = details.total_run_time_minutes;
            details.planned_minutes = details.valid_shifts as f64 * self.settings.shift_minutes;
            details.actual_productivity = safe_ratio(weighted_actual, runtime);
            details.target_productivity = safe_ratio(weighted_target, runtime);
            details.total_products_kg =
                details.total_good_products_kg + details.total_defect_products_kg;
            OeeScore::from_components(
                safe_ratio(runtime, details.planned_minutes),
                safe_ratio(weighted_performance, runtime),
                safe_ratio(details.total_good_products_kg, details.total_products_kg),
            )
        };

        Ok(DailyOee {
            machine_id,
            date,
            score,
            details,
            shifts,
        })
    }

    // ------------------------------------------------------------------------
    // Month
    // ------------------------------------------------------------------------

    fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), OeeError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| OeeError::InvalidPeriod(format!("{year}-{month:02}")))?;
        Ok((first, last_day_of_month(first)))
    }

    /// Method A: arithmetic mean of each valid day's components, multiplied.
    pub fn monthly_oee(&self, machine_id: u32, year: i32, month: u32) -> Result<MonthlyOee, OeeError> {
        let (first, last) = Self::month_bounds(year, month)?;

        let mut days = Vec::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            let daily = self.daily_oee(machine_id, date)?;
            if daily.score.is_valid() {
                days.push(DayScore {
                    date,
                    score: daily.score,
                });
            }
        }

        let score = if days.is_empty() {
            OeeScore::zero()
        } else {
            let n = days.len() as f64;
            let mean = |f: fn(&OeeScore) -> f64| days.iter().map(|d| f(&d.score)).sum::<f64>() / n;
            OeeScore::from_components(
                mean(|s| s.availability),
                mean(|s| s.performance),
                mean(|s| s.quality),
            )
        };

        info!(
            machine_id,
            year,
            month,
            valid_days = days.len(),
            oee = score.oee,
            "Monthly OEE computed"
        );

        Ok(MonthlyOee {
            machine_id,
            score,
            details: MonthlyDetails {
                year,
                month,
                valid_days: days.len(),
                days,
            },
        })
    }

    /// Method B: design capacity against externally planned time.
    ///
    /// Runtime is the counter-derived runtime of every configured shift of
    /// every day; mass totals cover all of the month's entries.
    pub fn monthly_oee_by_design(
        &self,
        machine_id: u32,
        year: i32,
        month: u32,
        params: &DesignCapacityParams,
    ) -> Result<DesignCapacityOee, OeeError> {
        let (first, last) = Self::month_bounds(year, month)?;

        let mut total_run_time_minutes = 0.0;
        let mut runtime_counter_resets = 0;
        for date in first.iter_days().take_while(|d| *d <= last) {
            for shift in &self.settings.shifts {
                let readings = self.readings.for_shift(machine_id, date, shift)?;
                let (runtime, resets) = runtime_from_counter(&readings);
                if resets > 0 {
                    warn!(
                        machine_id,
                        %date,
                        shift,
                        resets,
                        runtime,
                        "Runtime counter went backwards within shift, summing segments"
                    );
                }
                total_run_time_minutes += runtime;
                runtime_counter_resets += resets;
            }
        }

        let entries = self.production.for_range(machine_id, first, last)?;
        let mut d = DesignCapacityDetails {
            year,
            month,
            total_month_minutes: params.total_month_minutes,
            unplanned_minutes: params.unplanned_minutes,
            planned_minutes: params.planned_minutes(),
            total_run_time_minutes,
            total_run_time_hours: total_run_time_minutes / 60.0,
            runtime_counter_resets,
            design_capacity_kg_h: params.design_capacity_kg_h,
            ..Default::default()
        };
        for e in &entries {
            d.total_output_quantity += e.output_quantity;
            d.total_good_quantity += e.good_quantity;
            d.total_defect_weight_kg += e.defect_weight_kg;
            d.total_waste_weight_kg += e.waste_weight_kg;
            d.total_scrap_kg += e.total_scrap_kg();
            d.total_output_kg += self.converter.to_kilograms(&e.product_code, e.output_quantity);
            d.total_good_kg += self.converter.to_kilograms(&e.product_code, e.good_quantity);
        }
        d.actual_hourly_rate = safe_ratio(d.total_output_kg, d.total_run_time_hours);

        let score = OeeScore::from_components(
            safe_ratio(d.total_run_time_minutes, d.planned_minutes),
            safe_ratio(d.actual_hourly_rate, d.design_capacity_kg_h),
            safe_ratio(d.total_good_kg, d.total_output_kg),
        );

        Ok(DesignCapacityOee {
            machine_id,
            score,
            details: d,
        })
    }

    // ------------------------------------------------------------------------
    // Date range
    // ------------------------------------------------------------------------

    /// Per-day results for `start..=end` and an aggregate over valid days.
    ///
    /// Availability here plans 24 h per valid day, unlike the day-level
    /// per-shift convention. `start > end` yields an empty, all-zero result.
    pub fn range_oee(
        &self,
        machine_id: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeOee, OeeError> {
        let mut days = Vec::new();
        if start <= end {
            for date in start.iter_days().take_while(|d| *d <= end) {
                days.push(self.daily_oee(machine_id, date)?);
            }
        }

        let mut summary = RangeSummary::default();
        let mut actual_sum = 0.0;
        let mut target_sum = 0.0;
        for day in days.iter().filter(|d| d.is_valid()) {
            summary.valid_days += 1;
            summary.total_run_time_minutes += day.details.total_run_time_minutes;
            summary.total_good_products_kg += day.details.total_good_products_kg;
            summary.total_defect_products_kg += day.details.total_defect_products_kg;
            actual_sum += day.details.actual_productivity;
            target_sum += day.details.target_productivity;
        }

        let score = if summary.valid_days == 0 {
            OeeScore::zero()
        } else {
            let n = summary.valid_days as f64;
            summary.planned_minutes = n * self.settings.day_minutes;
            summary.actual_productivity = actual_sum / n;
            summary.target_productivity = target_sum / n;
            OeeScore::from_components(
                safe_ratio(summary.total_run_time_minutes, summary.planned_minutes),
                safe_ratio(summary.actual_productivity, summary.target_productivity),
                safe_ratio(
                    summary.total_good_products_kg,
                    summary.total_good_products_kg + summary.total_defect_products_kg,
                ),
            )
        };

        Ok(RangeOee {
            machine_id,
            start,
            end,
            score,
            details: summary,
            days,
        })
    }
}
