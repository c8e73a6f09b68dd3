//! Plan Builder - `DataModel` → ordered, dependency-linked steps.
//!
//! Two pieces:
//!
//! 1. **Dependency Resolution** (`resolver`): turns `Sheet!Field` tokens and
//!    table names into the step ids that currently produce them.
//!
//! 2. **Step Graph Compilation** (`step_compiler`): walks the model in four
//!    fixed phases, emitting steps and maintaining the field → step index
//!    the resolver reads from.
//!
//! Neither piece fails. Unresolvable references are logged and left for the
//! semantic validator to report.

pub mod resolver;
pub mod step_compiler;

pub use resolver::{resolve_precise_dependencies, resolve_table_dependencies, split_token};
pub use step_compiler::{compile, CompiledGraph};
