//! Deterministic rendering of clarification requests.
//!
//! Output depends only on the reason and the triggered items. Nothing is
//! inferred from the task text itself.

use super::heuristics::ClarificationItem;

/// Why no executable plan was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarificationReason {
    /// No data model was supplied.
    NoDataModel,
    /// A model was supplied but compiled to nothing.
    NoSteps,
    /// A step resolved to a catch-all action.
    DisallowedAction(String),
}

/// Render the user-facing clarification message.
pub fn render_clarification(reason: &ClarificationReason, items: &[ClarificationItem]) -> String {
    let mut lines = vec![render_reason(reason)];
    lines.push(String::new());

    if items.is_empty() {
        lines.push(
            "- Please describe the tables you need, their fields, and how any computed fields are derived."
                .to_string(),
        );
    } else {
        for item in items {
            lines.push(format!("- {}", render_item(item)));
        }
    }

    lines.join("\n")
}

fn render_reason(reason: &ClarificationReason) -> String {
    match reason {
        ClarificationReason::NoDataModel => {
            "I need a bit more detail before I can build a plan.".to_string()
        }
        ClarificationReason::NoSteps => {
            "I could not derive any spreadsheet steps from this request.".to_string()
        }
        ClarificationReason::DisallowedAction(action) => format!(
            "The request resolved to a generic '{action}' action, which cannot be executed safely."
        ),
    }
}

fn render_item(item: &ClarificationItem) -> String {
    match item {
        ClarificationItem::DescriptionTooShort { chars, min } => format!(
            "The description is very short ({chars} of at least {min} characters). What result do you want?"
        ),
        ClarificationItem::NoSheetMentioned => {
            "Which sheet or table should this apply to?".to_string()
        }
        ClarificationItem::NoRangeMentioned => {
            "Which columns or cell range are involved?".to_string()
        }
        ClarificationItem::ArithmeticWithoutExpression => {
            "You mentioned a calculation. Which fields should be combined, and with which operation?"
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_per_item() {
        let message = render_clarification(
            &ClarificationReason::NoDataModel,
            &[
                ClarificationItem::NoSheetMentioned,
                ClarificationItem::NoRangeMentioned,
            ],
        );
        let bullets: Vec<&str> = message.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(bullets.len(), 2);
        assert!(message.starts_with("I need a bit more detail"));
    }

    #[test]
    fn test_generic_line_when_nothing_triggered() {
        let message = render_clarification(&ClarificationReason::NoSteps, &[]);
        assert!(message.contains("describe the tables"));
    }

    #[test]
    fn test_disallowed_action_named() {
        let message = render_clarification(
            &ClarificationReason::DisallowedAction("execute_task".into()),
            &[],
        );
        assert!(message.contains("'execute_task'"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let items = [ClarificationItem::DescriptionTooShort { chars: 3, min: 8 }];
        assert_eq!(
            render_clarification(&ClarificationReason::NoDataModel, &items),
            render_clarification(&ClarificationReason::NoDataModel, &items)
        );
    }
}
