//! Step: the unit of execution handed to the external executor.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::SuccessCondition;

/// Action identifiers understood by the executor.
pub mod actions {
    pub const CREATE_SHEET: &str = "create_sheet";
    pub const WRITE_HEADERS: &str = "write_headers";
    pub const SET_FORMULA: &str = "set_formula";
    pub const ADD_VALIDATION: &str = "add_validation";
    pub const VERIFY_RESULTS: &str = "verify_results";
    pub const CLEAR_RANGE: &str = "clear_range";
}

// ============================================================================
// STEP ID
// ============================================================================

/// Opaque step identifier, unique within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

// ============================================================================
// PHASE / STATUS
// ============================================================================

/// Compilation phase a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    CreateStructure,
    WriteData,
    SetFormulas,
    AddValidation,
    Verify,
    /// Appended by the replanner.
    Recovery,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateStructure => "create_structure",
            Self::WriteData => "write_data",
            Self::SetFormulas => "set_formulas",
            Self::AddValidation => "add_validation",
            Self::Verify => "verify",
            Self::Recovery => "recovery",
        }
    }
}

/// Execution status of a step.
///
/// ```text
/// Pending ──► Running ──► Completed
///                │
///                └──► Failed
/// Pending ──► Skipped   (a dependency failed and was not recovered)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

// ============================================================================
// WRITE PREVIEW
// ============================================================================

/// Estimated footprint of a write step, shown before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritePreview {
    /// Sheet-local range (`A1:C1`, `D2:D`) or the sheet name for structure steps.
    pub affected_range: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cells: Option<u64>,

    #[serde(default)]
    pub overwrite_existing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl WritePreview {
    pub fn new(affected_range: impl Into<String>) -> Self {
        Self {
            affected_range: affected_range.into(),
            estimated_cells: None,
            overwrite_existing: false,
            warning: None,
        }
    }

    pub fn with_estimated_cells(mut self, cells: u64) -> Self {
        self.estimated_cells = Some(cells);
        self
    }

    pub fn overwriting(mut self, warning: impl Into<String>) -> Self {
        self.overwrite_existing = true;
        self.warning = Some(warning.into());
        self
    }
}

// ============================================================================
// STEP
// ============================================================================

/// A single executable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,

    /// Default linear execution order.
    pub order: u32,

    pub phase: StepPhase,

    /// Operation identifier consumed by the executor (see [`actions`]).
    pub action: String,

    /// Human-readable sentence describing the step.
    #[serde(default)]
    pub description: String,

    /// Opaque payload for the executor.
    #[serde(default)]
    pub parameters: Value,

    /// Steps that must complete first.
    #[serde(default)]
    pub depends_on: Vec<StepId>,

    #[serde(default)]
    pub is_write_operation: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_preview: Option<WritePreview>,

    pub success_condition: SuccessCondition,

    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    /// Create a pending, read-only step with a `tool_success` condition.
    pub fn new(
        id: impl Into<StepId>,
        order: u32,
        phase: StepPhase,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            order,
            phase,
            action: action.into(),
            description: String::new(),
            parameters: Value::Null,
            depends_on: Vec::new(),
            is_write_operation: false,
            write_preview: None,
            success_condition: SuccessCondition::ToolSuccess,
            status: StepStatus::Pending,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<StepId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Mark as a write step with its preview.
    pub fn writing(mut self, preview: WritePreview) -> Self {
        self.is_write_operation = true;
        self.write_preview = Some(preview);
        self
    }

    pub fn with_success_condition(mut self, condition: SuccessCondition) -> Self {
        self.success_condition = condition;
        self
    }

    /// String parameter lookup (`sheet`, `range`, `logicalFormula`, ...).
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// The sheet this step targets, if any.
    pub fn sheet(&self) -> Option<&str> {
        self.param_str("sheet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_builder_marks_write() {
        let step = Step::new("s1", 1, StepPhase::CreateStructure, actions::CREATE_SHEET)
            .with_parameters(json!({"sheet": "Orders"}))
            .writing(WritePreview::new("Orders"));
        assert!(step.is_write_operation);
        assert_eq!(step.sheet(), Some("Orders"));
        assert_eq!(step.status, StepStatus::Pending);
    }

    #[test]
    fn test_step_serializes_camel_case_and_snake_phase() {
        let step = Step::new("s2", 2, StepPhase::SetFormulas, actions::SET_FORMULA);
        let json = serde_json::to_value(&step).expect("serialize");
        assert_eq!(json["phase"], "set_formulas");
        assert!(json.get("dependsOn").is_some());
        assert!(json.get("isWriteOperation").is_some());
    }

    #[test]
    fn test_status_terminal_flags() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }
}
