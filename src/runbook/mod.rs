//! Running plans against an executor.
//!
//! 1. **`run_plan()`** drives an [`ExecutionPlan`](sheet_plan_types::ExecutionPlan)
//!    through a [`StepExecutor`], replanning failed steps as it goes.
//! 2. **`find_write_conflicts()`** / **`parallel_batches()`** report which
//!    write steps could safely run side by side. The run loop itself stays
//!    sequential.

pub mod executor;
pub mod write_set;

pub use executor::{run_plan, RunSummary, StepExecutor, StepOutcome, StepRecord};
pub use write_set::{find_write_conflicts, footprint, parallel_batches, Footprint, WriteConflict};
