//! Formula references: structured-reference rewriting and A1 ranges.

pub mod range;
pub mod translator;

pub use range::{col_to_name, name_to_col, split_sheet, CellRange, CellRef};
pub use translator::{translate, ReferenceTranslator};
