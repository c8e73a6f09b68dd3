//! Error types for the planner's fallible edges.
//!
//! Compilation, validation, risk assessment and replanning never fail; they
//! return structured results. Errors only arise when loading configuration,
//! parsing A1 ranges, or driving a plan through an executor.

use thiserror::Error;

use sheet_plan_types::{PlanPhase, StepId};

/// Main error type for the planner
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Range error: {0}")]
    Range(#[from] RangeParseError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        value: u64,
    },
}

/// A1 reference parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("Empty reference")]
    Empty,

    #[error("Invalid column '{0}'")]
    InvalidColumn(String),

    #[error("Invalid row in '{0}'")]
    InvalidRow(String),

    #[error("Malformed reference '{0}'")]
    Malformed(String),
}

/// Errors that stop the run loop
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Plan needs clarification before it can run: {message}")]
    NeedsClarification { message: String },

    #[error("Plan is not runnable (phase: {0:?})")]
    NotRunnable(PlanPhase),

    #[error("Step {0} not found in plan")]
    StepNotFound(StepId),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
