//! Declarative success conditions.
//!
//! Every write step carries one. The executor evaluates it against live
//! sheet state after running the step; the planner only declares it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Check the executor must pass before a step counts as completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessCondition {
    /// The tool call itself reported success.
    ToolSuccess,

    /// Cells in `range` equal `expected` (`null` means empty).
    ValueCheck {
        sheet: String,
        range: String,
        expected: Value,
    },

    RangeExists { sheet: String, range: String },

    /// A computed column produces `expected`.
    FormulaResult {
        sheet: String,
        column: String,
        expected: Value,
    },

    SheetExists { sheet: String },

    /// Row 1 of `sheet` equals `headers`, in order.
    HeadersMatch { sheet: String, headers: Vec<String> },

    /// No `#REF!`/`#VALUE!`/... in a sample of `sample_count` cells.
    #[serde(rename_all = "camelCase")]
    NoErrorValues {
        sheet: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
        sample_count: u32,
    },

    Custom { description: String, check: Value },
}

impl SuccessCondition {
    /// Tag name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolSuccess => "tool_success",
            Self::ValueCheck { .. } => "value_check",
            Self::RangeExists { .. } => "range_exists",
            Self::FormulaResult { .. } => "formula_result",
            Self::SheetExists { .. } => "sheet_exists",
            Self::HeadersMatch { .. } => "headers_match",
            Self::NoErrorValues { .. } => "no_error_values",
            Self::Custom { .. } => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_tagged_serialization() {
        let cond = SuccessCondition::NoErrorValues {
            sheet: "Orders".into(),
            column: Some("C".into()),
            sample_count: 5,
        };
        let json = serde_json::to_value(&cond).expect("serialize");
        assert_eq!(json["type"], "no_error_values");
        assert_eq!(json["sampleCount"], 5);
        assert_eq!(cond.kind(), "no_error_values");

        let back: SuccessCondition = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, cond);
    }

    #[test]
    fn test_unit_variant_round_trips_from_tag_only() {
        let cond: SuccessCondition =
            serde_json::from_str(r#"{"type": "tool_success"}"#).expect("deserialize");
        assert_eq!(cond, SuccessCondition::ToolSuccess);
    }
}
