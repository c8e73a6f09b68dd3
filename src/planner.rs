//! Plan pipeline.
//!
//! ```text
//! compile ──► gate (no steps / disallowed action) ──► semantic check ──► risks ──► plan
//!                 │
//!                 └──► clarification plan
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sheet_plan_types::{
    DataModel, ExecutionPlan, ModelValidationResult, SuccessCondition,
};

use crate::clarify::{clarification_message, ClarificationReason};
use crate::config::PlannerConfig;
use crate::plan_builder::{compile, CompiledGraph};
use crate::reference::col_to_name;
use crate::risk::assess_risks;
use crate::validation;

/// What the user asked for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub task_description: String,
    #[serde(default)]
    pub task_type: String,
}

impl PlanRequest {
    pub fn new(task_description: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            task_type: task_type.into(),
        }
    }
}

/// Build an executable plan, or a clarification plan when none can be built.
pub fn build_execution_plan(
    request: &PlanRequest,
    data_model: Option<&DataModel>,
    model_validation: Option<&ModelValidationResult>,
    config: &PlannerConfig,
) -> ExecutionPlan {
    let graph = compile(
        &request.task_description,
        &request.task_type,
        data_model,
        config,
    );

    if let Some(reason) = clarification_reason(&graph, data_model, config) {
        warn!(task_type = %request.task_type, ?reason, "plan needs clarification");
        let message = clarification_message(&request.task_description, &reason, config);
        return ExecutionPlan::clarification(
            request.task_description.as_str(),
            request.task_type.as_str(),
            message,
        );
    }

    let dependency_check = validation::check(
        &graph.steps,
        data_model,
        &graph.field_step_ids,
        model_validation,
    );
    let risks = assess_risks(
        &graph.steps,
        &dependency_check,
        &request.task_description,
        config,
    );
    let task_success_conditions = task_success_conditions(&graph, data_model, config);

    let mut plan = ExecutionPlan::new(
        request.task_description.as_str(),
        request.task_type.as_str(),
        graph.steps,
    );
    plan.dependency_check = dependency_check;
    plan.risks = risks;
    plan.task_success_conditions = task_success_conditions;
    plan.field_step_ids = graph.field_step_ids;

    info!(
        plan_id = %plan.id,
        steps = plan.steps.len(),
        passed = plan.dependency_check.passed,
        risks = plan.risks.len(),
        "built execution plan"
    );
    plan
}

fn clarification_reason(
    graph: &CompiledGraph,
    data_model: Option<&DataModel>,
    config: &PlannerConfig,
) -> Option<ClarificationReason> {
    if graph.is_empty() {
        return Some(match data_model {
            None => ClarificationReason::NoDataModel,
            Some(_) => ClarificationReason::NoSteps,
        });
    }
    graph
        .steps
        .iter()
        .find(|s| config.disallowed_actions.iter().any(|a| a == &s.action))
        .map(|s| ClarificationReason::DisallowedAction(s.action.clone()))
}

/// Whole-task checks: every table exists with its headers, and every
/// computed column is free of error values.
fn task_success_conditions(
    graph: &CompiledGraph,
    data_model: Option<&DataModel>,
    config: &PlannerConfig,
) -> Vec<SuccessCondition> {
    let Some(model) = data_model else {
        return Vec::new();
    };

    let mut conditions = Vec::new();
    for name in &graph.tables {
        let Some(table) = model.table(name) else {
            continue;
        };
        conditions.push(SuccessCondition::SheetExists {
            sheet: table.name.clone(),
        });
        conditions.push(SuccessCondition::HeadersMatch {
            sheet: table.name.clone(),
            headers: table.field_names(),
        });
    }

    for entry in &model.calculation_chain {
        let column = model
            .table(&entry.sheet)
            .and_then(|t| t.field_index(&entry.field))
            .map(|idx| col_to_name(idx as u32));
        conditions.push(SuccessCondition::NoErrorValues {
            sheet: entry.sheet.clone(),
            column,
            sample_count: config.formula_sample_count,
        });
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheet_plan_types::{CalculationEntry, Field, PlanPhase, Table};

    fn orders_model() -> DataModel {
        DataModel {
            tables: vec![Table::new(
                "Orders",
                vec![
                    Field::new("Quantity"),
                    Field::new("UnitPrice"),
                    Field::new("Amount").with_formula("=Quantity*UnitPrice"),
                ],
            )],
            execution_order: vec!["Orders".into()],
            calculation_chain: vec![CalculationEntry::new(
                "Orders",
                "Amount",
                "=Quantity*UnitPrice",
                vec!["Orders!Quantity".into(), "Orders!UnitPrice".into()],
            )],
        }
    }

    #[test]
    fn test_ready_plan_carries_task_conditions() {
        let request = PlanRequest::new("Compute order amounts on the Orders sheet", "formula");
        let plan = build_execution_plan(&request, Some(&orders_model()), None, &PlannerConfig::default());

        assert_eq!(plan.phase, PlanPhase::Ready);
        assert!(!plan.needs_clarification);
        assert!(plan.dependency_check.passed);
        let kinds: Vec<&str> = plan.task_success_conditions.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["sheet_exists", "headers_match", "no_error_values"]);
        assert_eq!(
            plan.task_success_conditions[2],
            SuccessCondition::NoErrorValues {
                sheet: "Orders".into(),
                column: Some("C".into()),
                sample_count: 5,
            }
        );
        assert!(plan.field_step_ids.owner("Orders", "Amount").is_some());
    }

    #[test]
    fn test_missing_model_asks_for_clarification() {
        let request = PlanRequest::new("do it", "formula");
        let plan = build_execution_plan(&request, None, None, &PlannerConfig::default());
        assert!(plan.needs_clarification);
        assert_eq!(plan.phase, PlanPhase::AwaitingClarification);
        assert!(plan.steps.is_empty());
        assert!(plan.clarification_message.is_some_and(|m| !m.is_empty()));
    }

    #[test]
    fn test_disallowed_action_forces_clarification() {
        let config = PlannerConfig {
            disallowed_actions: vec!["create_sheet".into()],
            ..PlannerConfig::default()
        };
        let request = PlanRequest::new("Build the Orders sheet", "structure");
        let plan = build_execution_plan(&request, Some(&orders_model()), None, &config);
        assert!(plan.needs_clarification);
        assert!(plan
            .clarification_message
            .as_deref()
            .is_some_and(|m| m.contains("create_sheet")));
    }
}
