//! Threshold Module - configured alert rules and their evaluation
//!
//! ## Architecture
//!
//! - `ThresholdRegistry`: validated rules grouped by machine
//! - `evaluator::check_rule`: pure check of one rule against one value
//! - `ThresholdEvaluator`: runs every active rule of a machine against a
//!   reading and records each firing in the alert store
//!
//! ## Rule kinds
//!
//! | kind | fires when | severity |
//! |---|---|---|
//! | boolean | state == `trigger_value` | danger |
//! | range | `value < min` or `value > max` | danger |
//! | percent | deviation from `base_value` > `allowed_percent` | danger |
//! | avg | deviation from trailing mean > `allowed_percent` | warning |

pub mod evaluator;

pub use evaluator::{check_rule, RuleOutcome, SkipReason, ThresholdEvaluator, Violation};

use std::collections::HashMap;
use tracing::{info, warn};

use crate::types::ThresholdRule;

/// Rules indexed by machine. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct ThresholdRegistry {
    by_machine: HashMap<u32, Vec<ThresholdRule>>,
}

impl ThresholdRegistry {
    /// Build from configured rules. Rules failing validation are dropped
    /// with a warning.
    pub fn from_rules(rules: impl IntoIterator<Item = ThresholdRule>) -> Self {
        let mut by_machine: HashMap<u32, Vec<ThresholdRule>> = HashMap::new();
        let mut rejected = 0usize;
        for rule in rules {
            if let Err(e) = rule.validate() {
                warn!(rule_id = rule.id, error = %e, "Ignoring invalid threshold rule");
                rejected += 1;
                continue;
            }
            by_machine.entry(rule.machine_id).or_default().push(rule);
        }
        for rules in by_machine.values_mut() {
            rules.sort_by_key(|r| r.id);
        }

        let registry = Self { by_machine };
        info!(
            rules = registry.len(),
            machines = registry.by_machine.len(),
            rejected,
            "Threshold registry loaded"
        );
        registry
    }

    /// Active rules of a machine, in rule-id order.
    pub fn active_for(&self, machine_id: u32) -> impl Iterator<Item = &ThresholdRule> {
        self.by_machine
            .get(&machine_id)
            .into_iter()
            .flatten()
            .filter(|r| r.active)
    }

    /// Whether any active rule of the machine needs the trailing window.
    pub fn needs_rolling_window(&self, machine_id: u32) -> bool {
        self.active_for(machine_id)
            .any(|r| r.condition.needs_rolling_window())
    }

    pub fn len(&self) -> usize {
        self.by_machine.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
