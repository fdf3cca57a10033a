//! Threshold Evaluator
//!
//! `check_rule` decides a single rule for a single value and never touches
//! storage. `ThresholdEvaluator` gathers the inputs (the reading's value and,
//! for avg rules, the trailing window mean), records each firing and keeps
//! going when one rule or one write fails.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::ThresholdRegistry;
use crate::storage::{AlertStore, ReadingStore};
use crate::types::{
    display_number, AlertEvent, MetricValue, NewAlert, Reading, RuleCondition, Severity,
    ThresholdRule,
};

// ============================================================================
// Pure rule check
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Boolean rule on a value with no boolean view
    NotBoolean,
    /// Numeric rule on a value with no numeric view
    NotNumeric,
    /// Percent rule with `base_value == 0`
    ZeroBase,
    /// Avg rule with no numeric samples in the window
    EmptyWindow,
    /// Avg rule whose window mean is 0
    ZeroMean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Fired(Violation),
    Clear,
    Skipped(SkipReason),
}

/// Percent deviation of `value` from `reference`, relative to `|reference|`.
///
/// Divides last so that exact inputs give exact percentages
/// (`|120 - 100| * 100 / 100 == 20`).
fn deviation_percent(value: f64, reference: f64) -> f64 {
    (value - reference).abs() * 100.0 / reference.abs()
}

/// Check one rule against one non-null value.
///
/// `window_mean` is the trailing mean for avg rules (`None` when the window
/// held no numeric samples); other kinds ignore it.
pub fn check_rule(rule: &ThresholdRule, value: &MetricValue, window_mean: Option<f64>) -> RuleOutcome {
    match &rule.condition {
        RuleCondition::Boolean {
            trigger_value,
            message,
        } => match value.as_bool() {
            None => RuleOutcome::Skipped(SkipReason::NotBoolean),
            Some(state) if state == *trigger_value => RuleOutcome::Fired(Violation {
                severity: Severity::Danger,
                message: message.clone(),
            }),
            Some(_) => RuleOutcome::Clear,
        },

        RuleCondition::Range { min, max } => {
            let Some(v) = value.as_f64() else {
                return RuleOutcome::Skipped(SkipReason::NotNumeric);
            };
            if let Some(hi) = max.filter(|hi| v > *hi) {
                return RuleOutcome::Fired(Violation {
                    severity: Severity::Danger,
                    message: format!(
                        "value {} exceeds max {} by {}",
                        display_number(v),
                        display_number(hi),
                        display_number(v - hi)
                    ),
                });
            }
            if let Some(lo) = min.filter(|lo| v < *lo) {
                return RuleOutcome::Fired(Violation {
                    severity: Severity::Danger,
                    message: format!(
                        "value {} below min {} by {}",
                        display_number(v),
                        display_number(lo),
                        display_number(lo - v)
                    ),
                });
            }
            RuleOutcome::Clear
        }

        RuleCondition::Percent {
            base_value,
            allowed_percent,
        } => {
            let Some(v) = value.as_f64() else {
                return RuleOutcome::Skipped(SkipReason::NotNumeric);
            };
            if *base_value == 0.0 {
                return RuleOutcome::Skipped(SkipReason::ZeroBase);
            }
            let deviation = deviation_percent(v, *base_value);
            if deviation > *allowed_percent {
                RuleOutcome::Fired(Violation {
                    severity: Severity::Danger,
                    message: format!(
                        "deviation {}% from base {} exceeds allowed {}% (value {})",
                        display_number(deviation),
                        display_number(*base_value),
                        display_number(*allowed_percent),
                        display_number(v)
                    ),
                })
            } else {
                RuleOutcome::Clear
            }
        }

        RuleCondition::Avg { allowed_percent } => {
            let Some(v) = value.as_f64() else {
                return RuleOutcome::Skipped(SkipReason::NotNumeric);
            };
            let Some(mean) = window_mean else {
                return RuleOutcome::Skipped(SkipReason::EmptyWindow);
            };
            if mean == 0.0 {
                return RuleOutcome::Skipped(SkipReason::ZeroMean);
            }
            let deviation = deviation_percent(v, mean);
            if deviation > *allowed_percent {
                RuleOutcome::Fired(Violation {
                    severity: Severity::Warning,
                    message: format!(
                        "value {} deviates {}% from trailing average {} (allowed {}%)",
                        display_number(v),
                        display_number(deviation),
                        display_number(mean),
                        display_number(*allowed_percent)
                    ),
                })
            } else {
                RuleOutcome::Clear
            }
        }
    }
}

/// Mean of the numeric values of `metric_key` over `window`.
pub fn window_mean(window: &[Reading], metric_key: &str) -> Option<f64> {
    let (sum, n) = window
        .iter()
        .filter_map(|r| r.metric_f64(metric_key))
        .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// ============================================================================
// Evaluator
// ============================================================================

/// Runs a machine's rules against each new reading and records alerts.
#[derive(Clone)]
pub struct ThresholdEvaluator {
    registry: Arc<ThresholdRegistry>,
    readings: ReadingStore,
    alerts: AlertStore,
    avg_window: Duration,
}

impl ThresholdEvaluator {
    pub fn new(
        registry: Arc<ThresholdRegistry>,
        readings: ReadingStore,
        alerts: AlertStore,
        avg_window: Duration,
    ) -> Self {
        Self {
            registry,
            readings,
            alerts,
            avg_window,
        }
    }

    /// Evaluate every active rule of `machine_id` against `reading`.
    ///
    /// Returns the events that were recorded. A rule that cannot be evaluated
    /// or whose alert cannot be stored is logged and skipped.
    pub fn evaluate(&self, machine_id: u32, reading: &Reading, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let rules: Vec<&ThresholdRule> = self.registry.active_for(machine_id).collect();
        if rules.is_empty() {
            info!(machine_id, "No threshold rules configured for machine");
            return Vec::new();
        }
        debug!(machine_id, rules = rules.len(), reading_id = reading.id, "Checking thresholds");

        let window = self.rolling_window(machine_id, &rules, now);
        let mut means: HashMap<&str, Option<f64>> = HashMap::new();
        let mut recorded = Vec::new();

        for rule in rules {
            let value = match reading.metric(&rule.metric_key) {
                None => {
                    warn!(
                        machine_id,
                        rule_id = rule.id,
                        metric = %rule.metric_key,
                        "Metric missing from reading, rule skipped"
                    );
                    continue;
                }
                Some(MetricValue::Null) => {
                    info!(rule_id = rule.id, metric = %rule.metric_key, "Null value, rule skipped");
                    continue;
                }
                Some(v) => v,
            };

            let mean = if rule.condition.needs_rolling_window() {
                match &window {
                    Some(w) => *means
                        .entry(rule.metric_key.as_str())
                        .or_insert_with(|| window_mean(w, &rule.metric_key)),
                    None => continue,
                }
            } else {
                None
            };

            match check_rule(rule, value, mean) {
                RuleOutcome::Clear => {
                    debug!(rule_id = rule.id, value = %value, "Within threshold");
                }
                RuleOutcome::Skipped(reason) => {
                    warn!(
                        machine_id,
                        rule_id = rule.id,
                        kind = rule.condition.kind_name(),
                        value = %value,
                        ?reason,
                        "Rule could not be evaluated"
                    );
                }
                RuleOutcome::Fired(violation) => {
                    info!(
                        machine_id,
                        rule = rule.label(),
                        severity = %violation.severity,
                        message = %violation.message,
                        "Threshold violated"
                    );
                    let alert = NewAlert {
                        machine_id,
                        reading_id: reading.id,
                        metric_key: rule.metric_key.clone(),
                        value: value.clone(),
                        severity: violation.severity,
                        message: violation.message,
                        threshold: rule.condition.bounds(),
                    };
                    match self.alerts.record_alert(alert, now) {
                        Ok(rec) => recorded.push(rec.event),
                        Err(e) => {
                            error!(
                                machine_id,
                                rule_id = rule.id,
                                error = %e,
                                "Failed to record alert"
                            );
                        }
                    }
                }
            }
        }

        recorded
    }

    /// Readings inside the avg window, loaded once per evaluation and only
    /// when an avg rule is active. `None` if the lookup failed.
    fn rolling_window(
        &self,
        machine_id: u32,
        rules: &[&ThresholdRule],
        now: DateTime<Utc>,
    ) -> Option<Vec<Reading>> {
        if !rules.iter().any(|r| r.condition.needs_rolling_window()) {
            return Some(Vec::new());
        }
        match self.readings.recorded_since(machine_id, now - self.avg_window) {
            Ok(window) => {
                debug!(machine_id, samples = window.len(), "Loaded avg window");
                Some(window)
            }
            Err(e) => {
                error!(machine_id, error = %e, "Failed to load avg window, avg rules skipped");
                None
            }
        }
    }
}
