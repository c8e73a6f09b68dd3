//! sheet-planner - spreadsheet task plans
//!
//! Compiles a logical data model into an ordered, dependency-checked list of
//! spreadsheet steps, and repairs the plan when a step fails at execution.
//!
//! ## Pipeline
//!
//! ```text
//! DataModel ─► plan_builder::compile ─► validation::check ─► risk::assess_risks ─► ExecutionPlan
//!                   │                                                                   │
//!                   └─ reference::translate (field names → @[Field])                    ▼
//!                                                                     runbook::run_plan ◄─► StepExecutor
//!                                                                             │
//!                                                                             └─ replan::Replanner
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheet_planner::{build_execution_plan, PlanRequest, PlannerConfig};
//!
//! let request = PlanRequest::new("Compute order amounts", "formula");
//! let plan = build_execution_plan(&request, None, None, &PlannerConfig::default());
//! assert!(plan.needs_clarification);
//! ```

// Core error handling
pub mod error;

pub mod config;

// A1 ranges and formula reference rewriting
pub mod reference;

// DataModel -> steps
pub mod plan_builder;
pub mod validation;
pub mod risk;
pub mod clarify;
pub mod planner;

// Failure handling and execution
pub mod replan;
pub mod runbook;

pub use config::PlannerConfig;
pub use error::{ConfigError, PlannerError, RangeParseError, Result, RunError};
pub use planner::{build_execution_plan, PlanRequest};
pub use replan::{ReplanContext, ReplanResult, ReplanStrategy, Replanner};
pub use runbook::{run_plan, RunSummary, StepExecutor, StepOutcome};

// Boundary types
pub use sheet_plan_types::{
    DataModel, DependencyCheckResult, ExecutionPlan, FieldStepIdMap, Step, StepId, StepStatus,
    SuccessCondition,
};
