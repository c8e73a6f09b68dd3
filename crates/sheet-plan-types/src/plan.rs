//! ExecutionPlan: the compiled artifact plus its execution bookkeeping.
//!
//! ```text
//! Ready ──► Executing ──► Completed
//!               │  ▲
//!               ▼  │ (steps appended)
//!           Replanning ──► Failed
//!
//! AwaitingClarification  (terminal until replaced; carries no steps)
//! ```
//!
//! A plan is extended, never rewritten: replanning appends steps and records
//! which appended step stands in for a failed one. Existing steps are never
//! removed or reordered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::check::{DependencyCheckResult, Risk};
use crate::condition::SuccessCondition;
use crate::field_map::FieldStepIdMap;
use crate::step::{Step, StepId, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    AwaitingClarification,
    #[default]
    Ready,
    Executing,
    Replanning,
    Completed,
    Failed,
}

/// How far a dependency is from being satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Satisfied,
    Waiting,
    /// Failed or skipped with no completed stand-in.
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub task_description: String,
    pub task_type: String,

    /// Steps in emission order.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Task-level checks independent of any single step.
    #[serde(default)]
    pub task_success_conditions: Vec<SuccessCondition>,

    #[serde(default)]
    pub dependency_check: DependencyCheckResult,

    #[serde(default)]
    pub risks: Vec<Risk>,

    /// Final field ownership after compilation.
    #[serde(default)]
    pub field_step_ids: FieldStepIdMap,

    /// Index into `steps` of the step most recently started.
    #[serde(default)]
    pub current_step: usize,

    #[serde(default)]
    pub completed_steps: Vec<StepId>,

    #[serde(default)]
    pub failed_steps: Vec<StepId>,

    #[serde(default)]
    pub phase: PlanPhase,

    #[serde(default)]
    pub replan_count: u32,

    /// failed step → appended step that stands in for it.
    #[serde(default)]
    pub supersessions: BTreeMap<StepId, StepId>,

    #[serde(default)]
    pub needs_clarification: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// A plan ready for execution.
    pub fn new(
        task_description: impl Into<String>,
        task_type: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_description: task_description.into(),
            task_type: task_type.into(),
            steps,
            task_success_conditions: Vec::new(),
            dependency_check: DependencyCheckResult::default(),
            risks: Vec::new(),
            field_step_ids: FieldStepIdMap::new(),
            current_step: 0,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            phase: PlanPhase::Ready,
            replan_count: 0,
            supersessions: BTreeMap::new(),
            needs_clarification: false,
            clarification_message: None,
            created_at: Utc::now(),
        }
    }

    /// A step-less plan asking the user for more detail.
    pub fn clarification(
        task_description: impl Into<String>,
        task_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut plan = Self::new(task_description, task_type, Vec::new());
        plan.phase = PlanPhase::AwaitingClarification;
        plan.needs_clarification = true;
        plan.clarification_message = Some(message.into());
        plan
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    fn set_status(&mut self, id: &StepId, status: StepStatus) -> bool {
        match self.step_index(id) {
            Some(idx) => {
                self.steps[idx].status = status;
                true
            }
            None => false,
        }
    }

    /// Returns false if the step is unknown.
    pub fn mark_running(&mut self, id: &StepId) -> bool {
        let Some(idx) = self.step_index(id) else {
            return false;
        };
        self.steps[idx].status = StepStatus::Running;
        self.current_step = idx;
        self.phase = PlanPhase::Executing;
        true
    }

    pub fn mark_completed(&mut self, id: &StepId) -> bool {
        let found = self.set_status(id, StepStatus::Completed);
        if found && !self.completed_steps.contains(id) {
            self.completed_steps.push(id.clone());
        }
        found
    }

    pub fn mark_failed(&mut self, id: &StepId) -> bool {
        let found = self.set_status(id, StepStatus::Failed);
        if found && !self.failed_steps.contains(id) {
            self.failed_steps.push(id.clone());
        }
        found
    }

    pub fn mark_skipped(&mut self, id: &StepId) -> bool {
        self.set_status(id, StepStatus::Skipped)
    }

    /// Follow supersessions from `id` and report the state of the last link.
    pub fn dependency_state(&self, id: &StepId) -> DependencyState {
        let mut current = id;
        // Each hop moves to a strictly later appended step, so the chain is
        // bounded by the step count.
        for _ in 0..=self.steps.len() {
            let Some(step) = self.step(current) else {
                return DependencyState::Dead;
            };
            match step.status {
                StepStatus::Completed => return DependencyState::Satisfied,
                StepStatus::Pending | StepStatus::Running => return DependencyState::Waiting,
                StepStatus::Failed | StepStatus::Skipped => match self.supersessions.get(current) {
                    Some(next) => current = next,
                    None => return DependencyState::Dead,
                },
            }
        }
        DependencyState::Dead
    }

    /// All `depends_on` entries are satisfied.
    pub fn is_step_ready(&self, step: &Step) -> bool {
        step.depends_on
            .iter()
            .all(|dep| self.dependency_state(dep) == DependencyState::Satisfied)
    }

    /// First pending step, in emission order, whose dependencies are satisfied.
    pub fn next_ready_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Pending && self.is_step_ready(s))
    }

    /// Append replanned steps after the current last order.
    ///
    /// `replacement` names the appended step that stands in for `failed`
    /// when dependents of `failed` are evaluated.
    pub fn apply_replan(
        &mut self,
        failed: &StepId,
        new_steps: Vec<Step>,
        replacement: Option<StepId>,
    ) -> Vec<StepId> {
        let mut next_order = self.steps.iter().map(|s| s.order).max().unwrap_or(0) + 1;
        let mut appended = Vec::with_capacity(new_steps.len());
        for mut step in new_steps {
            step.order = next_order;
            step.status = StepStatus::Pending;
            next_order += 1;
            appended.push(step.id.clone());
            self.steps.push(step);
        }
        if let Some(replacement) = replacement {
            if appended.contains(&replacement) {
                self.supersessions.insert(failed.clone(), replacement);
            }
        }
        self.replan_count += 1;
        appended
    }

    /// Every step reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }
}
