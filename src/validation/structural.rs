//! Structural pass: step-id integrity of the compiled graph.

use std::collections::{HashMap, HashSet, VecDeque};

use sheet_plan_types::{MissingDependency, Step, StepId};

/// Findings of the structural pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralReport {
    pub missing: Vec<MissingDependency>,
    pub duplicate_ids: Vec<StepId>,
    /// Each entry lists the step ids left over after topological sorting.
    pub cycles: Vec<Vec<String>>,
}

pub fn check_structure(steps: &[Step]) -> StructuralReport {
    let mut report = StructuralReport::default();

    let mut ids: HashSet<&StepId> = HashSet::with_capacity(steps.len());
    for step in steps {
        if !ids.insert(&step.id) && !report.duplicate_ids.contains(&step.id) {
            report.duplicate_ids.push(step.id.clone());
        }
    }

    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep) {
                report.missing.push(MissingDependency {
                    step_id: step.id.clone(),
                    missing_id: dep.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(steps) {
        report.cycles.push(cycle);
    }

    report
}

/// Kahn's algorithm over `depends_on`. Returns the ids that never reached
/// in-degree zero, in emission order, or `None` if the graph is acyclic.
///
/// Dangling edges are ignored here; they are reported as missing.
pub fn find_cycle(steps: &[Step]) -> Option<Vec<String>> {
    let index: HashMap<&StepId, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (&s.id, i))
        .collect();

    let n = steps.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, step) in steps.iter().enumerate() {
        let deps: HashSet<usize> = step
            .depends_on
            .iter()
            .filter_map(|d| index.get(d).copied())
            .collect();
        in_degree[i] = deps.len();
        for d in deps {
            dependents[d].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = vec![false; n];
    let mut sorted = 0usize;

    while let Some(node) = queue.pop_front() {
        visited[node] = true;
        sorted += 1;
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if sorted == n {
        return None;
    }

    Some(
        steps
            .iter()
            .enumerate()
            .filter(|(i, _)| !visited[*i])
            .map(|(_, s)| s.id.to_string())
            .collect(),
    )
}
