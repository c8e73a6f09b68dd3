//! Replanner
//!
//! Turns a failed step into repair steps:
//!
//! ```text
//! error text ──► classifier ──► FailureType ──► strategy ──► synthesis ──► new steps
//! ```
//!
//! The replanner never mutates the plan. The caller appends the returned
//! steps with [`ExecutionPlan::apply_replan`](sheet_plan_types::ExecutionPlan::apply_replan).

pub mod classifier;
pub mod strategy;
pub mod synthesis;

pub use classifier::{analyze_failure, classify, FailureAnalysis, FailureType};
pub use strategy::{select_strategy, ReplanStrategy};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sheet_plan_types::{Step, StepId};

use crate::config::PlannerConfig;
use synthesis::{StepIdMinter, Synthesis};

/// Execution state the replanner needs besides the failed step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplanContext {
    /// Repairs already applied to the plan.
    pub replan_count: u32,
    #[serde(default)]
    pub completed_steps: Vec<StepId>,
    /// Fallback error text when the executor reported none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplanResult {
    pub strategy: ReplanStrategy,
    pub new_steps: Vec<Step>,
    pub can_continue: bool,
    pub requires_user_confirmation: bool,
    pub analysis: FailureAnalysis,
    /// New step standing in for the failed one, for dependents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

pub struct Replanner {
    config: PlannerConfig,
}

impl Replanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn replan(&self, failed: &Step, error_text: &str, ctx: &ReplanContext) -> ReplanResult {
        let max_attempts = self.config.max_replan_attempts;
        let text = if error_text.trim().is_empty() {
            ctx.error_details.as_deref().unwrap_or_default()
        } else {
            error_text
        };

        let analysis = analyze_failure(failed, text, ctx.replan_count, max_attempts);
        let strategy = select_strategy(analysis.failure_type, ctx.replan_count, max_attempts);

        let mut ids = StepIdMinter::new(ctx.replan_count + 1);
        let Synthesis { steps, replacement } = match strategy {
            ReplanStrategy::SimpleRetry => synthesis::simple_retry(failed, &mut ids),
            ReplanStrategy::RetryWithFix => synthesis::retry_with_fix(failed, &mut ids),
            ReplanStrategy::AddPrerequisite => synthesis::add_prerequisite(failed, text, &mut ids),
            ReplanStrategy::SplitStep => {
                synthesis::split_step(failed, self.config.split_parts, &mut ids)
            }
            ReplanStrategy::AlternativeApproach => {
                synthesis::alternative_approach(failed, &mut ids)
            }
            ReplanStrategy::PartialRollback => synthesis::partial_rollback(failed, &mut ids),
            ReplanStrategy::Abort => Synthesis::default(),
        };

        let recommendation = match strategy {
            ReplanStrategy::Abort => Some(format!(
                "Stopped after {} repair attempt(s). {} Review the step manually before running the plan again.",
                ctx.replan_count, analysis.root_cause
            )),
            ReplanStrategy::PartialRollback => Some(format!(
                "Values written by step {} will be cleared. Review the step before retrying it.",
                failed.id
            )),
            _ => None,
        };

        if strategy == ReplanStrategy::Abort {
            warn!(
                step_id = %failed.id,
                failure = %analysis.failure_type,
                replan_count = ctx.replan_count,
                "replan ceiling reached, aborting"
            );
        } else {
            info!(
                step_id = %failed.id,
                failure = %analysis.failure_type,
                strategy = %strategy,
                new_steps = steps.len(),
                "replanned failed step"
            );
        }

        ReplanResult {
            strategy,
            can_continue: strategy.can_continue(),
            requires_user_confirmation: strategy.requires_user_confirmation(),
            new_steps: steps,
            analysis,
            replacement_step_id: replacement,
            recommendation,
        }
    }
}

impl Default for Replanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sheet_plan_types::{actions, StepPhase, StepStatus};

    fn failed_formula() -> Step {
        let mut step = Step::new("s3_set_formula_Orders_Amount", 3, StepPhase::SetFormulas, actions::SET_FORMULA)
            .with_parameters(json!({
                "sheet": "Orders",
                "field": "Amount",
                "column": "C",
                "logicalFormula": "=XLOOKUP(@[Sku], Products[Sku], Products[Price])",
            }));
        step.status = StepStatus::Failed;
        step
    }

    fn ctx(replan_count: u32) -> ReplanContext {
        ReplanContext {
            replan_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_ref_error_escalates() {
        let replanner = Replanner::default();
        let first = replanner.replan(&failed_formula(), "#REF!", &ctx(0));
        assert_eq!(first.strategy, ReplanStrategy::RetryWithFix);
        assert_eq!(
            first.new_steps[0].param_str("logicalFormula"),
            Some("=IFERROR(XLOOKUP(@[Sku], Products[Sku], Products[Price]), \"\")")
        );
        assert_eq!(first.new_steps[0].status, StepStatus::Pending);
        assert!(!first.requires_user_confirmation);

        let second = replanner.replan(&failed_formula(), "#REF!", &ctx(1));
        assert_eq!(second.strategy, ReplanStrategy::AlternativeApproach);
        assert_eq!(
            second.new_steps[0].param_str("logicalFormula"),
            Some("=INDEX(Products[Price], MATCH(@[Sku], Products[Sku], 0))")
        );
        assert!(second.requires_user_confirmation);
        assert_eq!(second.replacement_step_id, Some(second.new_steps[0].id.clone()));
    }

    #[test]
    fn test_ceiling_aborts_with_recommendation() {
        let result = Replanner::default().replan(&failed_formula(), "#REF!", &ctx(3));
        assert_eq!(result.strategy, ReplanStrategy::Abort);
        assert!(result.new_steps.is_empty());
        assert!(!result.can_continue);
        assert!(!result.analysis.is_recoverable);
        assert!(result.recommendation.is_some());
    }

    #[test]
    fn test_error_details_used_when_text_empty() {
        let context = ReplanContext {
            replan_count: 0,
            completed_steps: Vec::new(),
            error_details: Some("Sheet 'Products' not found".into()),
        };
        let result = Replanner::default().replan(&failed_formula(), "", &context);
        assert_eq!(result.analysis.failure_type, FailureType::MissingDependency);
        assert_eq!(result.strategy, ReplanStrategy::AddPrerequisite);
        assert_eq!(result.new_steps.len(), 2);
    }

    #[test]
    fn test_missing_column_re_emits_without_new_sheet() {
        let failed = failed_formula();
        let result = Replanner::default().replan(
            &failed,
            "Column 'Discount' does not exist in table Orders",
            &ctx(0),
        );
        assert_eq!(result.analysis.failure_type, FailureType::MissingDependency);
        assert_eq!(result.new_steps.len(), 1);
        assert_eq!(result.new_steps[0].action, actions::SET_FORMULA);
        assert_eq!(
            result.new_steps[0].param_str("logicalFormula"),
            failed.param_str("logicalFormula")
        );
        assert_eq!(result.replacement_step_id, Some(result.new_steps[0].id.clone()));
    }

    #[test]
    fn test_new_ids_never_reuse_failed_id() {
        let failed = failed_formula();
        let result = Replanner::default().replan(&failed, "boom", &ctx(0));
        assert_eq!(result.strategy, ReplanStrategy::SimpleRetry);
        assert!(result.new_steps.iter().all(|s| s.id != failed.id));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = Replanner::default().replan(&failed_formula(), "timeout", &ctx(0));
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["strategy"], "split_step");
        assert!(json.get("newSteps").is_some());
        assert!(json.get("requiresUserConfirmation").is_some());
    }
}
