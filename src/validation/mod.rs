//! Dependency validation of a compiled step graph against its data model.

pub mod semantic;
pub mod structural;

pub use semantic::{check, is_lookup_formula};
pub use structural::{check_structure, find_cycle, StructuralReport};
