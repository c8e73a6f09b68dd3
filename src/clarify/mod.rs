//! Clarification requests for plans that cannot be executed.
//!
//! ```text
//! task text ──► heuristics::detect ──► [ClarificationItem] ──► render ──► message
//! ```

pub mod heuristics;
pub mod render;

pub use heuristics::{detect, ClarificationItem};
pub use render::{render_clarification, ClarificationReason};

use crate::config::PlannerConfig;

/// Detect and render in one call.
pub fn clarification_message(
    task_description: &str,
    reason: &ClarificationReason,
    config: &PlannerConfig,
) -> String {
    let items = detect(task_description, config);
    render_clarification(reason, &items)
}
