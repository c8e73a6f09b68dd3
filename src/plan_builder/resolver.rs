//! Dependency resolution against the field → step index.
//!
//! Both resolvers are pure lookups. A miss is logged and skipped; the
//! semantic validator is responsible for reporting it.

use std::collections::HashSet;

use sheet_plan_types::{FieldStepIdMap, StepId};
use tracing::debug;

/// Resolve `Sheet!Field` tokens to the steps that currently own them.
///
/// Tokens that do not split into exactly two parts are skipped. The result
/// holds no duplicates and keeps first-seen order.
pub fn resolve_precise_dependencies<S: AsRef<str>>(
    tokens: &[S],
    field_step_ids: &FieldStepIdMap,
) -> Vec<StepId> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for token in tokens {
        let token = token.as_ref();
        let Some((sheet, field)) = split_token(token) else {
            debug!(token, "skipping malformed dependency token");
            continue;
        };
        match field_step_ids.owner(sheet, field) {
            Some(id) => {
                if seen.insert(id.clone()) {
                    resolved.push(id.clone());
                }
            }
            None => debug!(token, sheet, field, "dependency has no producing step"),
        }
    }

    resolved
}

/// Resolve table names to any one field step already registered for them.
pub fn resolve_table_dependencies<S: AsRef<str>>(
    tables: &[S],
    field_step_ids: &FieldStepIdMap,
) -> Vec<StepId> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for table in tables {
        let table = table.as_ref();
        match field_step_ids.any_for_table(table) {
            Some(id) => {
                if seen.insert(id.clone()) {
                    resolved.push(id.clone());
                }
            }
            None => debug!(sheet = table, "table dependency not yet produced"),
        }
    }

    resolved
}

/// `Sheet!Field` → `(Sheet, Field)`, requiring exactly one `!`.
pub fn split_token(token: &str) -> Option<(&str, &str)> {
    let mut parts = token.split('!');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(sheet), Some(field), None) => Some((sheet.trim(), field.trim())),
        _ => None,
    }
}
