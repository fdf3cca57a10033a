//! Threshold rules: per-machine, per-metric alert conditions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error("rule {rule_id}: metric_key must not be empty")]
    EmptyMetricKey { rule_id: u32 },

    #[error("rule {rule_id}: {kind} rule requires {parameter}")]
    MissingParameter {
        rule_id: u32,
        kind: &'static str,
        parameter: &'static str,
    },

    #[error("rule {rule_id}: {message}")]
    InvalidParameter { rule_id: u32, message: String },
}

/// Condition of a threshold rule. Each kind carries exactly its own parameters.
///
/// In TOML the kind is the `kind` key of the rule table; parameters
/// belonging to other kinds are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Fires when the tag's boolean state equals `trigger_value`
    Boolean {
        trigger_value: bool,
        #[serde(default)]
        message: String,
    },
    /// Fires below `min` or above `max` (strict)
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Fires when deviation from `base_value` exceeds `allowed_percent`
    Percent { base_value: f64, allowed_percent: f64 },
    /// Fires when deviation from the trailing window mean exceeds `allowed_percent`
    Avg { allowed_percent: f64 },
}

impl RuleCondition {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleCondition::Boolean { .. } => "boolean",
            RuleCondition::Range { .. } => "range",
            RuleCondition::Percent { .. } => "percent",
            RuleCondition::Avg { .. } => "avg",
        }
    }

    /// Bounds recorded on alerts for display (`min`/`max`, range rules only).
    pub fn bounds(&self) -> ThresholdSnapshot {
        match self {
            RuleCondition::Range { min, max } => ThresholdSnapshot {
                min: *min,
                max: *max,
            },
            _ => ThresholdSnapshot::default(),
        }
    }

    pub fn needs_rolling_window(&self) -> bool {
        matches!(self, RuleCondition::Avg { .. })
    }
}

/// Threshold bounds captured on an alert at the time it fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

fn default_active() -> bool {
    true
}

/// A configured threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub id: u32,
    pub machine_id: u32,
    #[serde(default)]
    pub name: String,
    /// Canonical reading key the rule watches (e.g. `nhiet_do_nhua_1`)
    pub metric_key: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(flatten)]
    pub condition: RuleCondition,
}

impl ThresholdRule {
    /// Display name, falling back to the metric key.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.metric_key
        } else {
            &self.name
        }
    }

    /// Check the kind-specific parameter invariants.
    pub fn validate(&self) -> Result<(), RuleError> {
        let rule_id = self.id;
        if self.metric_key.trim().is_empty() {
            return Err(RuleError::EmptyMetricKey { rule_id });
        }

        match &self.condition {
            RuleCondition::Boolean { message, .. } => {
                if message.trim().is_empty() {
                    return Err(RuleError::MissingParameter {
                        rule_id,
                        kind: "boolean",
                        parameter: "message",
                    });
                }
            }
            RuleCondition::Range { min, max } => {
                match (min, max) {
                    (None, None) => {
                        return Err(RuleError::MissingParameter {
                            rule_id,
                            kind: "range",
                            parameter: "min or max",
                        });
                    }
                    (Some(lo), Some(hi)) if hi <= lo => {
                        return Err(RuleError::InvalidParameter {
                            rule_id,
                            message: format!("max ({hi}) must be greater than min ({lo})"),
                        });
                    }
                    _ => {}
                }
                for bound in [min, max].into_iter().flatten() {
                    if !bound.is_finite() {
                        return Err(RuleError::InvalidParameter {
                            rule_id,
                            message: format!("range bound {bound} must be finite"),
                        });
                    }
                }
            }
            RuleCondition::Percent {
                base_value,
                allowed_percent,
            } => {
                if !base_value.is_finite() {
                    return Err(RuleError::InvalidParameter {
                        rule_id,
                        message: format!("base_value {base_value} must be finite"),
                    });
                }
                check_percent(rule_id, *allowed_percent)?;
            }
            RuleCondition::Avg { allowed_percent } => {
                check_percent(rule_id, *allowed_percent)?;
            }
        }

        Ok(())
    }
}

fn check_percent(rule_id: u32, allowed_percent: f64) -> Result<(), RuleError> {
    if !(0.0..=100.0).contains(&allowed_percent) {
        return Err(RuleError::InvalidParameter {
            rule_id,
            message: format!("allowed_percent ({allowed_percent}) must be between 0 and 100"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> ThresholdRule {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_range_rule_from_toml_ignores_foreign_parameters() {
        let rule = parse(
            r#"
            id = 3
            machine_id = 1
            metric_key = "ap_luc_nhua"
            kind = "range"
            max = 90
            base_value = 55.0
            "#,
        );
        assert_eq!(
            rule.condition,
            RuleCondition::Range {
                min: None,
                max: Some(90.0)
            }
        );
        assert!(rule.active);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_range_requires_a_bound() {
        let rule = parse(
            r#"
            id = 4
            machine_id = 1
            metric_key = "x"
            kind = "range"
            "#,
        );
        assert!(matches!(
            rule.validate(),
            Err(RuleError::MissingParameter { kind: "range", .. })
        ));
    }

    #[test]
    fn test_range_max_must_exceed_min() {
        let rule = parse(
            r#"
            id = 5
            machine_id = 1
            metric_key = "x"
            kind = "range"
            min = 10.0
            max = 10.0
            "#,
        );
        assert!(matches!(
            rule.validate(),
            Err(RuleError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_boolean_requires_message() {
        let rule = parse(
            r#"
            id = 6
            machine_id = 1
            metric_key = "e_stop"
            kind = "boolean"
            trigger_value = true
            "#,
        );
        assert!(matches!(
            rule.validate(),
            Err(RuleError::MissingParameter {
                parameter: "message",
                ..
            })
        ));
    }

    #[test]
    fn test_percent_bounds() {
        let rule = parse(
            r#"
            id = 7
            machine_id = 1
            metric_key = "speed"
            kind = "percent"
            base_value = 100.0
            allowed_percent = 120.0
            "#,
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_bounds_only_for_range() {
        let avg = RuleCondition::Avg {
            allowed_percent: 5.0,
        };
        assert_eq!(avg.bounds(), ThresholdSnapshot::default());
        assert!(avg.needs_rolling_window());
    }
}
