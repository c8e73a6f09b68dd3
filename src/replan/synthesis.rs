//! Step synthesis for each repair strategy.
//!
//! New steps always get fresh ids and `pending` status. Re-emitted copies
//! keep the failed step's phase; synthesized prerequisite and rollback steps
//! use `recovery`. Nothing here touches the failed step itself.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use sheet_plan_types::{
    actions, Step, StepId, StepPhase, StepStatus, SuccessCondition, WritePreview,
};

use crate::reference::{split_sheet, CellRange};

static MISSING_SHEET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"(?i)sheet\s+['"]([^'"]+)['"]\s+(?:was\s+)?not\s+found"#).unwrap(),
        Regex::new(r#"(?i)sheet\s+['"]([^'"]+)['"]\s+does\s+not\s+exist"#).unwrap(),
        Regex::new(r#"工作表\s*['"“「]?([^\s'"”」]+?)['"”」]?\s*不存在"#).unwrap(),
    ]
});

/// Steps produced for one strategy.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub steps: Vec<Step>,
    /// The new step that stands in for the failed one, if any.
    pub replacement: Option<StepId>,
}

// ---------------------------------------------------------------------------
// Id minting
// ---------------------------------------------------------------------------

/// Fresh ids of the form `r{attempt}_{token}_{k}`.
pub struct StepIdMinter {
    attempt: u32,
    token: String,
    next: u32,
}

impl StepIdMinter {
    pub fn new(attempt: u32) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self {
            attempt,
            token: simple[..8].to_string(),
            next: 1,
        }
    }

    pub fn mint(&mut self) -> StepId {
        let id = StepId::new(format!("r{}_{}_{}", self.attempt, self.token, self.next));
        self.next += 1;
        id
    }
}

fn re_emit(failed: &Step, id: StepId, note: &str) -> Step {
    let mut step = failed.clone();
    step.id = id;
    step.status = StepStatus::Pending;
    step.description = format!("{note}: {}", failed.description);
    step
}

fn set_param(step: &mut Step, key: &str, value: Value) {
    if !step.parameters.is_object() {
        step.parameters = json!({});
    }
    if let Some(map) = step.parameters.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

pub fn simple_retry(failed: &Step, ids: &mut StepIdMinter) -> Synthesis {
    let step = re_emit(failed, ids.mint(), "Retry");
    Synthesis {
        replacement: Some(step.id.clone()),
        steps: vec![step],
    }
}

pub fn retry_with_fix(failed: &Step, ids: &mut StepIdMinter) -> Synthesis {
    let mut step = re_emit(failed, ids.mint(), "Retry with error guard");
    if let Some(formula) = failed.param_str("logicalFormula") {
        let guarded = wrap_with_error_guard(formula);
        debug!(step_id = %failed.id, formula = %guarded, "guarded formula");
        set_param(&mut step, "logicalFormula", Value::String(guarded));
    }
    Synthesis {
        replacement: Some(step.id.clone()),
        steps: vec![step],
    }
}

pub fn add_prerequisite(failed: &Step, error_text: &str, ids: &mut StepIdMinter) -> Synthesis {
    let Some(sheet) = extract_missing_sheet(error_text) else {
        debug!(step_id = %failed.id, "no sheet name in error text, re-emitting");
        return simple_retry(failed, ids);
    };

    let create = Step::new(
        ids.mint(),
        failed.order,
        StepPhase::CreateStructure,
        actions::CREATE_SHEET,
    )
        .with_description(format!("Create missing sheet '{sheet}'"))
        .with_parameters(json!({ "sheet": sheet }))
        .writing(WritePreview::new(sheet.as_str()))
        .with_success_condition(SuccessCondition::SheetExists {
            sheet: sheet.clone(),
        });

    let mut retry = re_emit(failed, ids.mint(), "Retry after creating prerequisite");
    if !retry.depends_on.contains(&create.id) {
        retry.depends_on.push(create.id.clone());
    }

    Synthesis {
        replacement: Some(retry.id.clone()),
        steps: vec![create, retry],
    }
}

pub fn split_step(failed: &Step, parts: u32, ids: &mut StepIdMinter) -> Synthesis {
    let Some(raw) = failed.param_str("range") else {
        return simple_retry(failed, ids);
    };
    let (sheet, _) = split_sheet(raw);
    let pieces = match CellRange::parse(raw) {
        Ok(range) => range.split_rows(parts),
        Err(e) => {
            debug!(step_id = %failed.id, range = raw, error = %e, "range not splittable");
            return simple_retry(failed, ids);
        }
    };
    if pieces.len() < 2 {
        return simple_retry(failed, ids);
    }

    let total = pieces.len();
    let mut steps: Vec<Step> = Vec::with_capacity(total);
    for (i, piece) in pieces.into_iter().enumerate() {
        let text = match sheet {
            Some(sheet) => format!("{sheet}!{piece}"),
            None => piece.to_string(),
        };
        let mut step = re_emit(failed, ids.mint(), &format!("Part {}/{total}", i + 1));
        set_param(&mut step, "range", Value::String(text));
        if let Some(prev) = steps.last() {
            step.depends_on = vec![prev.id.clone()];
        }
        if let Some(preview) = step.write_preview.as_mut() {
            preview.affected_range = piece.to_string();
            preview.estimated_cells = piece.cell_count();
        }
        steps.push(step);
    }

    Synthesis {
        replacement: steps.last().map(|s| s.id.clone()),
        steps,
    }
}

pub fn alternative_approach(failed: &Step, ids: &mut StepIdMinter) -> Synthesis {
    let mut step = re_emit(failed, ids.mint(), "Alternative approach");
    if let Some(formula) = failed.param_str("logicalFormula") {
        match rewrite_xlookup(formula) {
            Some(rewritten) => {
                debug!(step_id = %failed.id, formula = %rewritten, "substituted formula");
                set_param(&mut step, "logicalFormula", Value::String(rewritten));
            }
            None => debug!(step_id = %failed.id, "no substitution rule matched"),
        }
    }
    Synthesis {
        replacement: Some(step.id.clone()),
        steps: vec![step],
    }
}

pub fn partial_rollback(failed: &Step, ids: &mut StepIdMinter) -> Synthesis {
    let sheet = failed.sheet().unwrap_or_default().to_string();
    let range = failed
        .param_str("range")
        .map(|r| split_sheet(r).1.to_string())
        .or_else(|| failed.param_str("column").map(|c| format!("{c}2:{c}")))
        .or_else(|| {
            failed
                .write_preview
                .as_ref()
                .map(|p| p.affected_range.clone())
        })
        .unwrap_or_else(|| sheet.clone());

    let clear = Step::new(ids.mint(), failed.order, StepPhase::Recovery, actions::CLEAR_RANGE)
        .with_description(format!(
            "Clear '{sheet}'!{range} written by failed step {}",
            failed.id
        ))
        .with_parameters(json!({
            "sheet": sheet,
            "range": range,
            "rollbackOf": failed.id,
        }))
        .writing(
            WritePreview::new(range.as_str())
                .overwriting(format!("Clears values written by step {}", failed.id)),
        )
        .with_success_condition(SuccessCondition::ValueCheck {
            sheet: sheet.clone(),
            range: range.clone(),
            expected: Value::Null,
        });

    Synthesis {
        steps: vec![clear],
        replacement: None,
    }
}

// ---------------------------------------------------------------------------
// Text rewrites
// ---------------------------------------------------------------------------

/// `=expr` → `=IFERROR(expr, "")`. A formula is already guarded only when
/// one `IFERROR(...)` call spans all of it.
pub fn wrap_with_error_guard(formula: &str) -> String {
    let body = formula.trim();
    let inner = body.strip_prefix('=').unwrap_or(body).trim();
    const GUARD: &str = "IFERROR(";
    let guarded = inner.to_ascii_uppercase().starts_with(GUARD)
        && split_call_args(inner, GUARD.len()).is_some_and(|(_, end)| end == inner.len());
    if guarded {
        return formula.to_string();
    }
    format!("=IFERROR({inner}, \"\")")
}

/// `XLOOKUP(a, b, c[, ...])` → `INDEX(c, MATCH(a, b, 0))`, nested calls
/// included. `None` when nothing was rewritten.
pub fn rewrite_xlookup(formula: &str) -> Option<String> {
    let (out, changed) = rewrite_xlookup_inner(formula);
    changed.then_some(out)
}

fn rewrite_xlookup_inner(text: &str) -> (String, bool) {
    const CALL: &str = "XLOOKUP(";
    let upper = text.to_ascii_uppercase();
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut pos = 0;

    while let Some(offset) = upper[pos..].find(CALL) {
        let start = pos + offset;
        let preceded_by_word = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let args_start = start + CALL.len();

        let parsed = if preceded_by_word {
            None
        } else {
            split_call_args(text, args_start)
        };
        match parsed {
            Some((args, end)) if args.len() >= 3 => {
                let args: Vec<String> = args
                    .iter()
                    .map(|a| rewrite_xlookup_inner(a.trim()).0)
                    .collect();
                out.push_str(&text[pos..start]);
                out.push_str(&format!(
                    "INDEX({}, MATCH({}, {}, 0))",
                    args[2], args[0], args[1]
                ));
                pos = end;
                changed = true;
            }
            _ => {
                out.push_str(&text[pos..args_start]);
                pos = args_start;
            }
        }
    }

    out.push_str(&text[pos..]);
    (out, changed)
}

/// Split top-level call arguments starting just after `(`. Returns the
/// arguments and the offset just past the closing `)`.
fn split_call_args(text: &str, args_start: usize) -> Option<(Vec<&str>, usize)> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut arg_start = args_start;
    let mut args = Vec::new();

    for (offset, c) in text[args_start..].char_indices() {
        let at = args_start + offset;
        match c {
            '"' => in_string = !in_string,
            _ if in_string => {}
            '(' | '{' => depth += 1,
            ')' if depth == 0 => {
                args.push(&text[arg_start..at]);
                return Some((args, at + 1));
            }
            ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(&text[arg_start..at]);
                arg_start = at + 1;
            }
            _ => {}
        }
    }
    None
}

/// Sheet name named as missing in executor error text.
pub fn extract_missing_sheet(error_text: &str) -> Option<String> {
    MISSING_SHEET_PATTERNS
        .iter()
        .find_map(|re| re.captures(error_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn formula_step(formula: &str) -> Step {
        Step::new("s3_set_formula_Orders_Amount", 3, StepPhase::SetFormulas, actions::SET_FORMULA)
            .with_description("Set formula")
            .with_parameters(json!({
                "sheet": "Orders",
                "field": "Amount",
                "column": "C",
                "logicalFormula": formula,
            }))
            .with_depends_on(vec![StepId::from("s2")])
            .writing(WritePreview::new("C2:C"))
    }

    #[test]
    fn test_error_guard_idempotent() {
        let once = wrap_with_error_guard("=@[Quantity]*@[UnitPrice]");
        assert_eq!(once, "=IFERROR(@[Quantity]*@[UnitPrice], \"\")");
        assert_eq!(wrap_with_error_guard(&once), once);
        assert_eq!(wrap_with_error_guard("=iferror(A1, 0)"), "=iferror(A1, 0)");
    }

    #[test]
    fn test_error_guard_wraps_partial_iferror() {
        let once = wrap_with_error_guard("=IFERROR(a,0)+b");
        assert_eq!(once, "=IFERROR(IFERROR(a,0)+b, \"\")");
        assert_eq!(wrap_with_error_guard(&once), once);
        assert_eq!(
            wrap_with_error_guard("=IFERROR(a,\")\")&IFERROR(b,0)"),
            "=IFERROR(IFERROR(a,\")\")&IFERROR(b,0), \"\")"
        );
    }

    #[test]
    fn test_xlookup_rewrite() {
        assert_eq!(
            rewrite_xlookup("=XLOOKUP(@[Sku], Products[Sku], Products[Price])").as_deref(),
            Some("=INDEX(Products[Price], MATCH(@[Sku], Products[Sku], 0))")
        );
        assert_eq!(
            rewrite_xlookup(r#"=xlookup(A2, B:B, C:C, "none")*2"#).as_deref(),
            Some("=INDEX(C:C, MATCH(A2, B:B, 0))*2")
        );
        assert_eq!(rewrite_xlookup("=SUM(A:A)"), None);
        assert_eq!(rewrite_xlookup("=MYXLOOKUP(A, B, C)"), None);
    }

    #[test]
    fn test_xlookup_nested_and_quoted_commas() {
        assert_eq!(
            rewrite_xlookup(r#"=XLOOKUP("a,b", K:K, XLOOKUP(1, X:X, Y:Y))"#).as_deref(),
            Some(r#"=INDEX(INDEX(Y:Y, MATCH(1, X:X, 0)), MATCH("a,b", K:K, 0))"#)
        );
    }

    #[test]
    fn test_extract_missing_sheet() {
        assert_eq!(
            extract_missing_sheet("Sheet 'Products' not found").as_deref(),
            Some("Products")
        );
        assert_eq!(
            extract_missing_sheet("Error: worksheet 'Price List' does not exist").as_deref(),
            Some("Price List")
        );
        assert_eq!(
            extract_missing_sheet("Column 'Discount' does not exist in table Orders"),
            None
        );
        assert_eq!(extract_missing_sheet("Named range \"Rates\" does not exist"), None);
        assert_eq!(extract_missing_sheet("工作表 产品 不存在").as_deref(), Some("产品"));
        assert_eq!(extract_missing_sheet("range not found"), None);
    }

    #[test]
    fn test_add_prerequisite_links_retry() {
        let mut ids = StepIdMinter::new(1);
        let synth = add_prerequisite(&formula_step("=1"), "Sheet 'Products' not found", &mut ids);
        assert_eq!(synth.steps.len(), 2);
        let (create, retry) = (&synth.steps[0], &synth.steps[1]);
        assert_eq!(create.action, actions::CREATE_SHEET);
        assert_eq!(create.phase, StepPhase::CreateStructure);
        assert_eq!(create.sheet(), Some("Products"));
        assert_eq!(retry.depends_on, vec![StepId::from("s2"), create.id.clone()]);
        assert_eq!(synth.replacement, Some(retry.id.clone()));
    }

    #[test]
    fn test_missing_column_is_not_a_missing_sheet() {
        let mut ids = StepIdMinter::new(1);
        let failed = formula_step("=1");
        let synth = add_prerequisite(
            &failed,
            "Column 'Discount' does not exist in table Orders",
            &mut ids,
        );
        assert_eq!(synth.steps.len(), 1);
        assert_eq!(synth.steps[0].action, actions::SET_FORMULA);
        assert_eq!(synth.steps[0].depends_on, failed.depends_on);
        assert!(synth.steps.iter().all(|s| s.action != actions::CREATE_SHEET));
    }

    #[test]
    fn test_split_step_chains_parts() {
        let step = Step::new("w1", 1, StepPhase::WriteData, "write_range")
            .with_parameters(json!({"sheet": "Orders", "range": "Orders!A2:C10"}))
            .writing(WritePreview::new("A2:C10"));
        let mut ids = StepIdMinter::new(2);
        let synth = split_step(&step, 3, &mut ids);

        let ranges: Vec<_> = synth.steps.iter().map(|s| s.param_str("range").unwrap()).collect();
        assert_eq!(ranges, vec!["Orders!A2:C4", "Orders!A5:C7", "Orders!A8:C10"]);
        assert!(synth.steps[0].depends_on.is_empty());
        assert_eq!(synth.steps[1].depends_on, vec![synth.steps[0].id.clone()]);
        assert_eq!(synth.steps[2].depends_on, vec![synth.steps[1].id.clone()]);
        assert_eq!(
            synth.steps[0].write_preview.as_ref().unwrap().estimated_cells,
            Some(9)
        );
        assert_eq!(synth.replacement, Some(synth.steps[2].id.clone()));
    }

    #[test]
    fn test_split_without_range_re_emits() {
        let mut ids = StepIdMinter::new(1);
        let synth = split_step(&formula_step("=1"), 3, &mut ids);
        assert_eq!(synth.steps.len(), 1);
        assert_eq!(synth.steps[0].param_str("logicalFormula"), Some("=1"));
    }

    #[test]
    fn test_partial_rollback_clears_column() {
        let mut ids = StepIdMinter::new(2);
        let synth = partial_rollback(&formula_step("=1"), &mut ids);
        assert_eq!(synth.steps.len(), 1);
        assert!(synth.replacement.is_none());
        let clear = &synth.steps[0];
        assert_eq!(clear.action, actions::CLEAR_RANGE);
        assert_eq!(clear.param_str("range"), Some("C2:C"));
        assert!(clear.write_preview.as_ref().unwrap().overwrite_existing);
        assert_eq!(
            clear.success_condition,
            SuccessCondition::ValueCheck {
                sheet: "Orders".into(),
                range: "C2:C".into(),
                expected: Value::Null,
            }
        );
    }

    #[test]
    fn test_minted_ids_are_fresh() {
        let mut ids = StepIdMinter::new(1);
        let a = ids.mint();
        let b = ids.mint();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("r1_"));
        assert!(a.as_str().ends_with("_1"));
    }
}
