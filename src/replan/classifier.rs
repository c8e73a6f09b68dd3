//! Failure Classifier
//!
//! Maps executor error text to a [`FailureType`] by literal pattern
//! matching. First match wins:
//!
//! | Pattern | Type |
//! |---------|------|
//! | `#REF!` | reference_error |
//! | `#VALUE!`, `#DIV/0!`, `#N/A` | value_error |
//! | `#NAME?` | name_error |
//! | timeout, timed out, 超时 | timeout |
//! | not found, does not exist, 不存在, 找不到 | missing_dependency |
//! | (empty) | unknown |
//! | anything else | execution_error |

use serde::{Deserialize, Serialize};

use sheet_plan_types::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    ReferenceError,
    ValueError,
    NameError,
    MissingDependency,
    Timeout,
    ExecutionError,
    Unknown,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReferenceError => "reference_error",
            Self::ValueError => "value_error",
            Self::NameError => "name_error",
            Self::MissingDependency => "missing_dependency",
            Self::Timeout => "timeout",
            Self::ExecutionError => "execution_error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const VALUE_ERROR_CODES: &[&str] = &["#VALUE!", "#DIV/0!", "#N/A"];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "超时"];
const MISSING_PATTERNS: &[&str] = &["not found", "does not exist", "不存在", "找不到"];

/// Classify executor error text.
pub fn classify(error_text: &str) -> FailureType {
    let text = error_text.trim();
    if text.is_empty() {
        return FailureType::Unknown;
    }

    let upper = text.to_uppercase();
    let lower = text.to_lowercase();

    if upper.contains("#REF!") {
        FailureType::ReferenceError
    } else if VALUE_ERROR_CODES.iter().any(|c| upper.contains(c)) {
        FailureType::ValueError
    } else if upper.contains("#NAME?") {
        FailureType::NameError
    } else if TIMEOUT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureType::Timeout
    } else if MISSING_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureType::MissingDependency
    } else {
        FailureType::ExecutionError
    }
}

/// Classification plus a human-readable diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub failure_type: FailureType,
    pub root_cause: String,
    pub suggestions: Vec<String>,
    pub is_recoverable: bool,
}

/// Diagnose a failed step.
///
/// Recoverable while `replan_count` is below `max_attempts`.
pub fn analyze_failure(
    step: &Step,
    error_text: &str,
    replan_count: u32,
    max_attempts: u32,
) -> FailureAnalysis {
    let failure_type = classify(error_text);
    let target = step
        .sheet()
        .map(|sheet| match step.param_str("field") {
            Some(field) => format!("'{sheet}'.'{field}'"),
            None => format!("'{sheet}'"),
        })
        .unwrap_or_else(|| format!("step {}", step.id));

    let (root_cause, suggestions): (String, Vec<&str>) = match failure_type {
        FailureType::ReferenceError => (
            format!("Formula for {target} references a cell or range that is not valid (#REF!)"),
            vec![
                "Check that every referenced column still exists",
                "Guard the formula against invalid references",
                "Rewrite the lookup with INDEX/MATCH",
            ],
        ),
        FailureType::ValueError => (
            format!("Formula for {target} produced a value error"),
            vec![
                "Check the data types of the referenced columns",
                "Guard the formula with IFERROR",
            ],
        ),
        FailureType::NameError => (
            format!("Formula for {target} uses a function or name the host does not recognise (#NAME?)"),
            vec![
                "Replace unsupported functions with equivalents",
                "Check field names for typos",
            ],
        ),
        FailureType::MissingDependency => (
            format!("{target} needs a sheet or field that does not exist yet"),
            vec![
                "Create the missing sheet first",
                "Check the execution order of the data model",
            ],
        ),
        FailureType::Timeout => (
            format!("Operation on {target} timed out"),
            vec!["Split the operation into smaller ranges"],
        ),
        FailureType::ExecutionError => (
            format!("Executing {target} failed: {}", error_text.trim()),
            vec!["Retry the step", "Roll back the partial write and review the step"],
        ),
        FailureType::Unknown => (
            format!("Executing {target} failed without an error message"),
            vec!["Retry the step", "Inspect the sheet state manually"],
        ),
    };

    FailureAnalysis {
        failure_type,
        root_cause,
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        is_recoverable: replan_count < max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sheet_plan_types::{actions, StepPhase};

    #[test]
    fn test_classification_order() {
        assert_eq!(classify("Cell shows #REF! and #VALUE!"), FailureType::ReferenceError);
        assert_eq!(classify("#DIV/0! in D5"), FailureType::ValueError);
        assert_eq!(classify("#n/a"), FailureType::ValueError);
        assert_eq!(classify("#NAME? in C2"), FailureType::NameError);
        assert_eq!(classify("Request Timed Out"), FailureType::Timeout);
        assert_eq!(classify("操作超时"), FailureType::Timeout);
        assert_eq!(classify("Sheet 'Products' not found"), FailureType::MissingDependency);
        assert_eq!(classify("工作表 Products 不存在"), FailureType::MissingDependency);
        assert_eq!(classify("   "), FailureType::Unknown);
        assert_eq!(classify("host crashed"), FailureType::ExecutionError);
    }

    #[test]
    fn test_timeout_wins_over_not_found() {
        assert_eq!(classify("timeout: range not found"), FailureType::Timeout);
    }

    #[test]
    fn test_analysis_recoverable_below_ceiling() {
        let step = Step::new("s3", 3, StepPhase::SetFormulas, actions::SET_FORMULA)
            .with_parameters(json!({"sheet": "Orders", "field": "Amount"}));
        let analysis = analyze_failure(&step, "#REF!", 2, 3);
        assert!(analysis.is_recoverable);
        assert!(analysis.root_cause.contains("'Orders'.'Amount'"));
        assert!(!analysis.suggestions.is_empty());

        assert!(!analyze_failure(&step, "#REF!", 3, 3).is_recoverable);
    }
}
