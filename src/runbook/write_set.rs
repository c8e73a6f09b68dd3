//! Write footprints and write-write conflicts.
//!
//! Each write step touches either an A1 range of one sheet or, when its
//! range cannot be parsed (structure steps carry the sheet name), the whole
//! sheet. Two write steps conflict when their footprints overlap and no
//! `depends_on` path orders them.
//!
//! `parallel_batches()` groups steps by dependency depth and splits each
//! depth level so that no batch holds two conflicting steps.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use sheet_plan_types::{Step, StepId};

use crate::reference::{split_sheet, CellRange};

// ---------------------------------------------------------------------------
// Footprint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Footprint {
    WholeSheet,
    Range(CellRange),
}

impl Footprint {
    pub fn overlaps(&self, other: &Footprint) -> bool {
        match (self, other) {
            (Footprint::Range(a), Footprint::Range(b)) => a.overlaps(b),
            _ => true,
        }
    }
}

/// Sheet and footprint of a write step. `None` for read-only steps and
/// writes with no sheet.
pub fn footprint(step: &Step) -> Option<(String, Footprint)> {
    if !step.is_write_operation {
        return None;
    }
    let sheet = step.sheet()?.to_string();
    let raw = step.param_str("range").or_else(|| {
        step.write_preview
            .as_ref()
            .map(|p| p.affected_range.as_str())
    });
    let (_, local) = split_sheet(raw.unwrap_or_default());
    let area = match CellRange::parse(local) {
        Ok(range) => Footprint::Range(range),
        Err(_) => Footprint::WholeSheet,
    };
    Some((sheet, area))
}

/// Two unordered writes with overlapping footprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConflict {
    pub sheet: String,
    pub first: StepId,
    pub second: StepId,
}

// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

struct StepGraph {
    /// Dependencies of each step, as indices into the step slice.
    deps: Vec<Vec<usize>>,
}

impl StepGraph {
    fn new(steps: &[Step]) -> Self {
        let index: HashMap<&StepId, usize> =
            steps.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();
        let deps = steps
            .iter()
            .map(|s| {
                s.depends_on
                    .iter()
                    .filter_map(|d| index.get(d).copied())
                    .collect()
            })
            .collect();
        Self { deps }
    }

    /// Every step reachable backwards from `idx` through `depends_on`.
    fn ancestors(&self, idx: usize) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut stack = self.deps[idx].clone();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.deps[next].iter().copied());
            }
        }
        seen
    }

    /// Kahn order plus the depth of each sorted step. Steps on a cycle are
    /// left out.
    fn levels(&self) -> (Vec<usize>, Vec<usize>) {
        let n = self.deps.len();
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in self.deps.iter().enumerate() {
            for &d in deps {
                dependents[d].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(n);
        let mut depth = vec![0usize; n];
        while let Some(node) = queue.pop_front() {
            sorted.push(node);
            for &dependent in &dependents[node] {
                depth[dependent] = depth[dependent].max(depth[node] + 1);
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        (sorted, depth)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Every pair of unordered write steps with overlapping footprints, in
/// emission order.
pub fn find_write_conflicts(steps: &[Step]) -> Vec<WriteConflict> {
    let graph = StepGraph::new(steps);
    let footprints: Vec<Option<(String, Footprint)>> = steps.iter().map(footprint).collect();
    let ancestors: Vec<HashSet<usize>> = (0..steps.len()).map(|i| graph.ancestors(i)).collect();

    let mut conflicts = Vec::new();
    for i in 0..steps.len() {
        let Some((sheet_a, area_a)) = &footprints[i] else {
            continue;
        };
        for j in (i + 1)..steps.len() {
            let Some((sheet_b, area_b)) = &footprints[j] else {
                continue;
            };
            if sheet_a != sheet_b || !area_a.overlaps(area_b) {
                continue;
            }
            if ancestors[i].contains(&j) || ancestors[j].contains(&i) {
                continue;
            }
            conflicts.push(WriteConflict {
                sheet: sheet_a.clone(),
                first: steps[i].id.clone(),
                second: steps[j].id.clone(),
            });
        }
    }
    conflicts
}

/// Groups of steps that could run concurrently, in execution order.
///
/// Steps on a dependency cycle are placed one per batch at the end.
pub fn parallel_batches(steps: &[Step]) -> Vec<Vec<StepId>> {
    let graph = StepGraph::new(steps);
    let footprints: Vec<Option<(String, Footprint)>> = steps.iter().map(footprint).collect();
    let (sorted, depth) = graph.levels();

    let max_depth = sorted.iter().map(|&i| depth[i]).max().unwrap_or(0);
    let mut levels: Vec<Vec<usize>> = vec![Vec::new(); max_depth + 1];
    for &i in &sorted {
        levels[depth[i]].push(i);
    }

    let conflicts = |a: usize, b: usize| match (&footprints[a], &footprints[b]) {
        (Some((sheet_a, area_a)), Some((sheet_b, area_b))) => {
            sheet_a == sheet_b && area_a.overlaps(area_b)
        }
        _ => false,
    };

    let mut batches: Vec<Vec<StepId>> = Vec::new();
    for mut level in levels.into_iter().filter(|l| !l.is_empty()) {
        level.sort_unstable();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for idx in level {
            match groups
                .iter_mut()
                .find(|g| g.iter().all(|&other| !conflicts(idx, other)))
            {
                Some(group) => group.push(idx),
                None => groups.push(vec![idx]),
            }
        }
        batches.extend(
            groups
                .into_iter()
                .map(|g| g.into_iter().map(|i| steps[i].id.clone()).collect()),
        );
    }

    let placed: HashSet<usize> = sorted.into_iter().collect();
    batches.extend(
        (0..steps.len())
            .filter(|i| !placed.contains(i))
            .map(|i| vec![steps[i].id.clone()]),
    );
    batches
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sheet_plan_types::{actions, StepPhase, WritePreview};

    fn write(id: &str, sheet: &str, range: &str, deps: &[&str]) -> Step {
        Step::new(id, 1, StepPhase::SetFormulas, actions::SET_FORMULA)
            .with_parameters(json!({ "sheet": sheet }))
            .with_depends_on(deps.iter().map(|d| StepId::from(*d)).collect())
            .writing(WritePreview::new(range))
    }

    fn ids(batch: &[StepId]) -> Vec<&str> {
        batch.iter().map(StepId::as_str).collect()
    }

    #[test]
    fn test_disjoint_columns_do_not_conflict() {
        let steps = vec![
            write("a", "Orders", "C2:C", &[]),
            write("b", "Orders", "D2:D", &[]),
            write("c", "Refunds", "C2:C", &[]),
        ];
        assert!(find_write_conflicts(&steps).is_empty());
    }

    #[test]
    fn test_overlap_without_ordering_conflicts() {
        let steps = vec![
            write("a", "Orders", "A2:C10", &[]),
            write("b", "Orders", "C5:C", &[]),
        ];
        assert_eq!(
            find_write_conflicts(&steps),
            vec![WriteConflict {
                sheet: "Orders".into(),
                first: "a".into(),
                second: "b".into(),
            }]
        );
    }

    #[test]
    fn test_transitive_ordering_clears_conflict() {
        let steps = vec![
            write("a", "Orders", "C2:C", &[]),
            Step::new("mid", 2, StepPhase::Verify, actions::VERIFY_RESULTS)
                .with_depends_on(vec!["a".into()]),
            write("b", "Orders", "C2:C", &["mid"]),
        ];
        assert!(find_write_conflicts(&steps).is_empty());
    }

    #[test]
    fn test_sheet_footprint_overlaps_everything_on_sheet() {
        let steps = vec![
            write("create", "Orders", "Orders", &[]),
            write("b", "Orders", "Z100", &[]),
        ];
        assert_eq!(find_write_conflicts(&steps).len(), 1);
    }

    #[test]
    fn test_batches_split_conflicting_level() {
        let steps = vec![
            write("root", "Orders", "Orders", &[]),
            write("c", "Orders", "C2:C", &["root"]),
            write("d", "Orders", "D2:D", &["root"]),
            write("c_again", "Orders", "C2:C9", &["root"]),
            write("tail", "Orders", "E2:E", &["c", "d"]),
        ];
        let batches = parallel_batches(&steps);
        let batches: Vec<Vec<&str>> = batches.iter().map(|b| ids(b)).collect();
        assert_eq!(
            batches,
            vec![
                vec!["root"],
                vec!["c", "d"],
                vec!["c_again"],
                vec!["tail"],
            ]
        );
    }

    #[test]
    fn test_cycle_members_trail_singly() {
        let steps = vec![
            write("a", "S", "A1", &[]),
            write("x", "S", "B1", &["y"]),
            write("y", "S", "C1", &["x"]),
        ];
        let batches = parallel_batches(&steps);
        let batches: Vec<Vec<&str>> = batches.iter().map(|b| ids(b)).collect();
        assert_eq!(batches, vec![vec!["a"], vec!["x"], vec!["y"]]);
    }
}
