//! Dependency-check verdict and risk findings attached to a plan.

use serde::{Deserialize, Serialize};

use crate::step::StepId;

// ============================================================================
// DEPENDENCY CHECK
// ============================================================================

/// A `depends_on` edge pointing at a step that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDependency {
    pub step_id: StepId,
    pub missing_id: StepId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticDependencyType {
    /// A formula names another field.
    FormulaReference,
    /// A lookup function reads from another table.
    LookupSource,
    /// A table is fed from another table's data.
    DataSource,
}

/// A dependency that exists in meaning, resolved or not.
///
/// `source_*` is the dependent field; `target_*` is what it needs. An empty
/// `target_field` denotes a table-level dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticDependency {
    pub source_sheet: String,
    pub source_field: String,
    pub target_sheet: String,
    pub target_field: String,
    pub dependency_type: SemanticDependencyType,
    pub is_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_step_id: Option<StepId>,
}

impl SemanticDependency {
    pub fn target_token(&self) -> String {
        if self.target_field.is_empty() {
            self.target_sheet.clone()
        } else {
            format!("{}!{}", self.target_sheet, self.target_field)
        }
    }
}

/// Merged verdict of the structural and semantic passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCheckResult {
    pub passed: bool,

    #[serde(default)]
    pub missing_dependencies: Vec<MissingDependency>,

    #[serde(default)]
    pub circular_dependencies: Vec<Vec<String>>,

    /// Every semantic dependency examined, resolved or not.
    #[serde(default)]
    pub semantic_dependencies: Vec<SemanticDependency>,

    #[serde(default)]
    pub unresolved_semantic_deps: Vec<SemanticDependency>,

    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DependencyCheckResult {
    /// Recompute `passed` from the three blocking collections.
    pub fn finalize(&mut self) {
        self.passed = self.missing_dependencies.is_empty()
            && self.circular_dependencies.is_empty()
            && self.unresolved_semantic_deps.is_empty();
    }
}

// ============================================================================
// RISKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A qualitative risk finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub level: RiskLevel,
    pub description: String,
    pub mitigation: String,
}

impl Risk {
    pub fn new(level: RiskLevel, description: impl Into<String>, mitigation: impl Into<String>) -> Self {
        Self {
            level,
            description: description.into(),
            mitigation: mitigation.into(),
        }
    }
}
