//! Risk assessment over a compiled plan.
//!
//! Each rule is independent; every rule that fires contributes exactly one
//! finding. Output order follows the rule order below.

use sheet_plan_types::{actions, DependencyCheckResult, Risk, RiskLevel, Step};

use crate::config::PlannerConfig;

pub fn assess_risks(
    steps: &[Step],
    dependency_check: &DependencyCheckResult,
    task_description: &str,
    config: &PlannerConfig,
) -> Vec<Risk> {
    let mut risks = Vec::new();

    let structural = dependency_check.missing_dependencies.len()
        + dependency_check.circular_dependencies.len();
    if structural > 0 {
        risks.push(Risk::new(
            RiskLevel::High,
            format!("{structural} step dependency issue(s) (missing or circular)"),
            "Fix the data model so every step depends only on steps that exist and precede it",
        ));
    }

    let unresolved = dependency_check.unresolved_semantic_deps.len();
    if unresolved > 0 {
        risks.push(Risk::new(
            RiskLevel::High,
            format!("{unresolved} semantic dependency(ies) reference missing sheets or fields"),
            "Create the referenced sheets/fields first or correct the formulas",
        ));
    }

    if steps.len() > config.step_count_risk_threshold {
        risks.push(Risk::new(
            RiskLevel::Medium,
            format!("Plan has {} steps and may take a long time to execute", steps.len()),
            "Execute in stages and confirm intermediate results",
        ));
    }

    let formulas = steps
        .iter()
        .filter(|s| s.action == actions::SET_FORMULA)
        .count();
    if formulas > config.formula_count_risk_threshold {
        risks.push(Risk::new(
            RiskLevel::Medium,
            format!("{formulas} formula steps; an early error can cascade to dependent columns"),
            "Verify each computed column before relying on downstream formulas",
        ));
    }

    let description = task_description.to_lowercase();
    if config
        .cross_table_keywords
        .iter()
        .any(|k| description.contains(&k.to_lowercase()))
    {
        risks.push(Risk::new(
            RiskLevel::Medium,
            "Task involves cross-table lookups",
            "Make sure lookup keys exist and match in both tables",
        ));
    }

    let overwrites = steps
        .iter()
        .filter(|s| {
            s.is_write_operation
                && s.write_preview
                    .as_ref()
                    .is_some_and(|p| p.overwrite_existing)
        })
        .count();
    if overwrites > 0 {
        risks.push(Risk::new(
            RiskLevel::Medium,
            format!("{overwrites} write step(s) overwrite existing data"),
            "Back up affected ranges before executing",
        ));
    }

    risks
}

/// Highest level among `risks`, if any.
pub fn highest_level(risks: &[Risk]) -> Option<RiskLevel> {
    risks.iter().map(|r| r.level).max()
}
