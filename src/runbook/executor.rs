//! Run loop for execution plans.
//!
//! `run_plan()` hands ready steps to a [`StepExecutor`] one at a time, in
//! emission order. A failed step goes to the [`Replanner`]; its repair steps
//! are appended to the plan and the loop continues until nothing is ready.
//!
//! ## Skipping
//!
//! A pending step whose dependency failed, with no replacement appended for
//! it, is marked `skipped`. Skips cascade to the step's own dependents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sheet_plan_types::{
    DependencyState, ExecutionPlan, PlanPhase, Step, StepId, StepStatus,
};

use crate::error::RunError;
use crate::replan::{ReplanContext, ReplanResult, Replanner};

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// What the executor reports for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// One entry in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: StepId,
    pub action: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of driving a plan to the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub plan_id: Uuid,
    pub final_phase: PlanPhase,
    /// Executed and skipped steps, in the order they were decided.
    pub records: Vec<StepRecord>,
    pub replans: Vec<ReplanResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn count(&self, status: StepStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// StepExecutor trait
// ---------------------------------------------------------------------------

/// Executes a single step against a live workbook.
///
/// Implementations evaluate the step's success condition themselves and
/// report the verdict through [`StepOutcome::success`].
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(&self, step: &Step) -> StepOutcome;
}

// ---------------------------------------------------------------------------
// run_plan
// ---------------------------------------------------------------------------

/// Drive `plan` through `executor`, replanning failures.
///
/// ## Flow
///
/// 1. Refuse clarification plans and plans that already finished
/// 2. Skip pending steps with a dead dependency
/// 3. Run the first ready step
/// 4. On failure, replan and append the repair steps (abort stops the run)
/// 5. When nothing is ready, skip what is left and settle the final phase
pub async fn run_plan(
    plan: &mut ExecutionPlan,
    executor: &dyn StepExecutor,
    replanner: &Replanner,
) -> Result<RunSummary, RunError> {
    if plan.needs_clarification {
        return Err(RunError::NeedsClarification {
            message: plan.clarification_message.clone().unwrap_or_default(),
        });
    }
    if matches!(plan.phase, PlanPhase::Completed | PlanPhase::Failed) {
        return Err(RunError::NotRunnable(plan.phase));
    }

    let started_at = Utc::now();
    let mut records = Vec::new();
    let mut replans = Vec::new();
    plan.phase = PlanPhase::Executing;
    info!(plan_id = %plan.id, steps = plan.steps.len(), "running plan");

    loop {
        skip_dead_steps(plan, &mut records);

        let Some(step) = plan.next_ready_step().cloned() else {
            break;
        };
        if !plan.mark_running(&step.id) {
            return Err(RunError::StepNotFound(step.id));
        }
        debug!(step_id = %step.id, action = %step.action, "executing step");

        let outcome = executor.execute_step(&step).await;
        if outcome.success {
            plan.mark_completed(&step.id);
            records.push(record(&step, StepStatus::Completed, outcome));
            continue;
        }

        plan.mark_failed(&step.id);
        plan.phase = PlanPhase::Replanning;
        warn!(
            step_id = %step.id,
            error = outcome.error.as_deref().unwrap_or_default(),
            "step failed"
        );

        let ctx = ReplanContext {
            replan_count: plan.replan_count,
            completed_steps: plan.completed_steps.clone(),
            error_details: outcome.output.as_ref().map(Value::to_string),
        };
        let error_text = outcome.error.clone().unwrap_or_default();
        records.push(record(&step, StepStatus::Failed, outcome));

        let result = replanner.replan(&step, &error_text, &ctx);
        if !result.can_continue {
            replans.push(result);
            plan.phase = PlanPhase::Failed;
            return Ok(summarize(plan, records, replans, started_at));
        }

        let appended = plan.apply_replan(
            &step.id,
            result.new_steps.clone(),
            result.replacement_step_id.clone(),
        );
        debug!(failed = %step.id, appended = appended.len(), "appended repair steps");
        replans.push(result);
        plan.phase = PlanPhase::Executing;
    }

    // Anything still pending waits on a step that can never run.
    let stranded: Vec<Step> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .cloned()
        .collect();
    for step in stranded {
        warn!(step_id = %step.id, "step never became ready");
        plan.mark_skipped(&step.id);
        records.push(record(&step, StepStatus::Skipped, StepOutcome::default()));
    }

    plan.phase = if has_unrecovered_failure(plan) {
        PlanPhase::Failed
    } else {
        PlanPhase::Completed
    };
    Ok(summarize(plan, records, replans, started_at))
}

/// Mark pending steps with a dead dependency as skipped, until no more
/// skips cascade.
fn skip_dead_steps(plan: &mut ExecutionPlan, records: &mut Vec<StepRecord>) {
    loop {
        let dead: Vec<Step> = plan
            .steps
            .iter()
            .filter(|s| {
                s.status == StepStatus::Pending
                    && s.depends_on
                        .iter()
                        .any(|dep| plan.dependency_state(dep) == DependencyState::Dead)
            })
            .cloned()
            .collect();
        if dead.is_empty() {
            return;
        }
        for step in dead {
            debug!(step_id = %step.id, "dependency failed, skipping");
            plan.mark_skipped(&step.id);
            records.push(record(&step, StepStatus::Skipped, StepOutcome::default()));
        }
    }
}

fn has_unrecovered_failure(plan: &ExecutionPlan) -> bool {
    plan.failed_steps
        .iter()
        .any(|id| plan.dependency_state(id) != DependencyState::Satisfied)
}

fn record(step: &Step, status: StepStatus, outcome: StepOutcome) -> StepRecord {
    StepRecord {
        step_id: step.id.clone(),
        action: step.action.clone(),
        status,
        output: outcome.output,
        error: outcome.error,
    }
}

fn summarize(
    plan: &ExecutionPlan,
    records: Vec<StepRecord>,
    replans: Vec<ReplanResult>,
    started_at: DateTime<Utc>,
) -> RunSummary {
    info!(
        plan_id = %plan.id,
        phase = ?plan.phase,
        replans = replans.len(),
        "plan run finished"
    );
    RunSummary {
        plan_id: plan.id,
        final_phase: plan.phase,
        records,
        replans,
        started_at,
        finished_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
