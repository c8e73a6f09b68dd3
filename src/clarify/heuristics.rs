//! Structural heuristics over a task description.
//!
//! These only look at the shape of the text. They decide which questions to
//! ask, never what the answer is.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::PlannerConfig;

static SHEET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sheet|sheets|table|tables|tab|tabs|worksheet|workbook)\b|工作表|表格|表|'[^']+'!|[\p{L}\p{N}_]+!")
        .unwrap()
});

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\$?[A-Z]{1,3}\$?[0-9]+(?::\$?[A-Z]{1,3}\$?[0-9]+)?\b|\b[A-Z]{1,3}:[A-Z]{1,3}\b|\b(?:column|columns|col|range|ranges|cell|cells|row|rows|field|fields)\b|列|区域|单元格|字段|行",
    )
    .unwrap()
});

static ARITHMETIC_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:calculate|calculates|compute|computes|sum|sums|total|totals|multiply|multiplied|divide|divided|average|subtract|product)\b|计算|求和|合计|总计|乘|除|平均",
    )
    .unwrap()
});

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}_\])]\s*[*/+×÷]\s*[\p{L}\p{N}_\[(@]|\s-\s|\b[A-Z][A-Z0-9.]+\(|=")
        .unwrap()
});

/// One reason to ask the user for more detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarificationItem {
    DescriptionTooShort { chars: usize, min: usize },
    NoSheetMentioned,
    NoRangeMentioned,
    ArithmeticWithoutExpression,
}

/// Evaluate every heuristic, in a fixed order.
pub fn detect(task_description: &str, config: &PlannerConfig) -> Vec<ClarificationItem> {
    let text = task_description.trim();
    let mut items = Vec::new();

    let chars = text.chars().count();
    if chars < config.min_description_chars {
        items.push(ClarificationItem::DescriptionTooShort {
            chars,
            min: config.min_description_chars,
        });
    }
    if !SHEET_RE.is_match(text) {
        items.push(ClarificationItem::NoSheetMentioned);
    }
    if !RANGE_RE.is_match(text) {
        items.push(ClarificationItem::NoRangeMentioned);
    }
    if ARITHMETIC_INTENT_RE.is_match(text) && !EXPRESSION_RE.is_match(text) {
        items.push(ClarificationItem::ArithmeticWithoutExpression);
    }

    items
}
