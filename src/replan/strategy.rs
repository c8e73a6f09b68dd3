//! Repair strategy decision table.
//!
//! | failure type | first attempt | later attempts |
//! |---|---|---|
//! | missing_dependency | add_prerequisite | add_prerequisite |
//! | reference_error | retry_with_fix | alternative_approach |
//! | value_error | retry_with_fix | retry_with_fix |
//! | name_error | alternative_approach | alternative_approach |
//! | timeout | split_step | split_step |
//! | execution_error, unknown | simple_retry | partial_rollback |
//!
//! At or past the attempt ceiling every failure resolves to `abort`.

use serde::{Deserialize, Serialize};

use super::classifier::FailureType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanStrategy {
    SimpleRetry,
    RetryWithFix,
    AddPrerequisite,
    SplitStep,
    AlternativeApproach,
    PartialRollback,
    Abort,
}

impl ReplanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleRetry => "simple_retry",
            Self::RetryWithFix => "retry_with_fix",
            Self::AddPrerequisite => "add_prerequisite",
            Self::SplitStep => "split_step",
            Self::AlternativeApproach => "alternative_approach",
            Self::PartialRollback => "partial_rollback",
            Self::Abort => "abort",
        }
    }

    pub fn can_continue(&self) -> bool {
        !matches!(self, Self::Abort)
    }

    /// Strategies that change what the user asked for.
    pub fn requires_user_confirmation(&self) -> bool {
        matches!(self, Self::AlternativeApproach | Self::PartialRollback)
    }
}

impl std::fmt::Display for ReplanStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn select_strategy(
    failure_type: FailureType,
    replan_count: u32,
    max_attempts: u32,
) -> ReplanStrategy {
    if replan_count >= max_attempts {
        return ReplanStrategy::Abort;
    }

    let first_attempt = replan_count == 0;
    match failure_type {
        FailureType::MissingDependency => ReplanStrategy::AddPrerequisite,
        FailureType::ReferenceError if first_attempt => ReplanStrategy::RetryWithFix,
        FailureType::ReferenceError => ReplanStrategy::AlternativeApproach,
        FailureType::ValueError => ReplanStrategy::RetryWithFix,
        FailureType::NameError => ReplanStrategy::AlternativeApproach,
        FailureType::Timeout => ReplanStrategy::SplitStep,
        FailureType::ExecutionError | FailureType::Unknown if first_attempt => {
            ReplanStrategy::SimpleRetry
        }
        FailureType::ExecutionError | FailureType::Unknown => ReplanStrategy::PartialRollback,
    }
}
