//! Planner configuration.
//!
//! Thresholds and limits default to the values the planner is tuned for.
//! They can be loaded from YAML and overridden by `SHEET_PLANNER_*`
//! environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunable limits for compilation, risk assessment and replanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Cells sampled by each `no_error_values` condition.
    pub formula_sample_count: u32,

    /// Replan attempts before a failure resolves to `abort`.
    pub max_replan_attempts: u32,

    /// Maximum sub-ranges produced by `split_step`.
    pub split_parts: u32,

    /// Step count above which execution time is flagged.
    pub step_count_risk_threshold: usize,

    /// Formula step count above which cross-formula errors are flagged.
    pub formula_count_risk_threshold: usize,

    /// Shorter (trimmed) task descriptions trigger a clarification line.
    pub min_description_chars: usize,

    /// Task-description keywords that imply a cross-table lookup.
    pub cross_table_keywords: Vec<String>,

    /// Catch-all actions that are never handed to an executor.
    pub disallowed_actions: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            formula_sample_count: 5,
            max_replan_attempts: 3,
            split_parts: 3,
            step_count_risk_threshold: 20,
            formula_count_risk_threshold: 5,
            min_description_chars: 8,
            cross_table_keywords: [
                "lookup", "vlookup", "xlookup", "cross-table", "cross table", "across tables",
                "join", "match", "查找", "跨表", "关联", "引用",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            disallowed_actions: ["execute", "execute_task", "run_task"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PlannerConfig {
    /// Load from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_yaml_str(&content)
    }

    /// Load from a YAML string. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHEET_PLANNER_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_FORMULA_SAMPLE_COUNT")? {
            self.formula_sample_count = v;
        }
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_MAX_REPLAN_ATTEMPTS")? {
            self.max_replan_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_SPLIT_PARTS")? {
            self.split_parts = v;
        }
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_STEP_COUNT_RISK_THRESHOLD")? {
            self.step_count_risk_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_FORMULA_COUNT_RISK_THRESHOLD")? {
            self.formula_count_risk_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "SHEET_PLANNER_MIN_DESCRIPTION_CHARS")? {
            self.min_description_chars = v;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.formula_sample_count < 1 {
            return Err(ConfigError::OutOfRange {
                field: "formula_sample_count",
                min: 1,
                value: self.formula_sample_count.into(),
            });
        }
        if self.split_parts < 1 {
            return Err(ConfigError::OutOfRange {
                field: "split_parts",
                min: 1,
                value: self.split_parts.into(),
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
    }
}
