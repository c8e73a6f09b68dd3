//! Shared plan types for sheet-planner
//!
//! This crate is the SINGLE SOURCE OF TRUTH for every type that crosses the
//! planner's two boundaries.
//!
//! ## Boundaries
//!
//! ```text
//! ┌──────────────────┐  DataModel   ┌──────────────────┐  ExecutionPlan  ┌──────────────────┐
//! │  Modeler         │ ───────────► │  sheet-planner   │ ──────────────► │  Step executor   │
//! │  (external)      │  + verdict   │  (core)          │ ◄────────────── │  (external)      │
//! └──────────────────┘              └──────────────────┘  outcome/error  └──────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. camelCase field names on the wire
//! 2. Tagged enums only: `#[serde(tag = "type")]` for payload-carrying variants
//! 3. The planner never mutates a `DataModel`; plans are only ever extended

pub mod check;
pub mod condition;
pub mod field_map;
pub mod model;
pub mod plan;
pub mod step;

pub use check::{
    DependencyCheckResult, MissingDependency, Risk, RiskLevel, SemanticDependency,
    SemanticDependencyType,
};
pub use condition::SuccessCondition;
pub use field_map::FieldStepIdMap;
pub use model::{
    CalculationEntry, DataModel, Field, ModelValidationResult, Table, ValidationKind,
    ValidationRule,
};
pub use plan::{DependencyState, ExecutionPlan, PlanPhase};
pub use step::{actions, Step, StepId, StepPhase, StepStatus, WritePreview};
