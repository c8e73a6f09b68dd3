//! FieldStepIdMap: which step currently owns each `(table, field)` value.
//!
//! Registration order is preserved so that "any field step of a table"
//! resolves to the same id on every run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::step::StepId;

/// `table name → field name → step id`.
///
/// Scoped to a single compilation; entries are only ever overwritten by a
/// later step that supersedes the earlier owner of the same field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldStepIdMap(IndexMap<String, IndexMap<String, StepId>>);

impl FieldStepIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `(table, field)` at `step_id`, returning the previous owner.
    pub fn register(
        &mut self,
        table: impl Into<String>,
        field: impl Into<String>,
        step_id: StepId,
    ) -> Option<StepId> {
        self.0
            .entry(table.into())
            .or_default()
            .insert(field.into(), step_id)
    }

    /// Current owner of `(table, field)`.
    pub fn owner(&self, table: &str, field: &str) -> Option<&StepId> {
        self.0.get(table).and_then(|fields| fields.get(field))
    }

    /// The first registered field step of `table`, standing in for
    /// "the table is ready".
    pub fn any_for_table(&self, table: &str) -> Option<&StepId> {
        self.0
            .get(table)
            .and_then(|fields| fields.values().next())
    }

    pub fn contains(&self, table: &str, field: &str) -> bool {
        self.owner(table, field).is_some()
    }

    /// `(table, field, owner)` triples in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &StepId)> {
        self.0.iter().flat_map(|(table, fields)| {
            fields
                .iter()
                .map(move |(field, id)| (table.as_str(), field.as_str(), id))
        })
    }

    /// Number of `(table, field)` pairs.
    pub fn len(&self) -> usize {
        self.0.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
