//! Semantic validator: do the references in the model mean something?
//!
//! ```text
//! steps ───────────► structural pass ──┐
//! calculation chain ► chain pass ──────┼──► DependencyCheckResult
//! lookup formulas ──► lookup pass ─────┤
//! table dependsOn ──► data-source pass ┤
//! upstream verdict ─► merged verbatim ─┘
//! ```
//!
//! `passed` is true only when there are no missing step ids, no cycles and
//! no unresolved semantic dependencies. Warnings never block.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use sheet_plan_types::{
    DataModel, DependencyCheckResult, FieldStepIdMap, ModelValidationResult, SemanticDependency,
    SemanticDependencyType, Step, Table,
};

use super::structural::check_structure;
use crate::plan_builder::split_token;

/// `Sheet!` or `'Sheet Name'!` prefixes inside a formula.
static SHEET_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:'([^']+)'|([\p{L}_][\p{L}\p{N}_]*))!(?:([\p{L}_][\p{L}\p{N}_]*))?").unwrap()
});

/// Run every pass and merge the findings into one verdict.
pub fn check(
    steps: &[Step],
    data_model: Option<&DataModel>,
    field_step_ids: &FieldStepIdMap,
    upstream: Option<&ModelValidationResult>,
) -> DependencyCheckResult {
    let mut result = DependencyCheckResult::default();

    let structural = check_structure(steps);
    result.missing_dependencies = structural.missing;
    for id in structural.duplicate_ids {
        result.errors.push(format!("Duplicate step id '{id}'"));
    }
    result.circular_dependencies = structural.cycles;

    if let Some(model) = data_model {
        let resolver = SemanticResolver {
            model,
            field_step_ids,
        };
        resolver.calculation_chain_pass(&mut result);
        resolver.lookup_pass(&mut result);
        resolver.data_source_pass(&mut result);
    }

    if let Some(upstream) = upstream {
        result
            .circular_dependencies
            .extend(upstream.circular_dependencies.iter().cloned());
        result.errors.extend(upstream.errors.iter().cloned());
        result.warnings.extend(upstream.warnings.iter().cloned());
    }

    for missing in &result.missing_dependencies {
        warn!(step_id = %missing.step_id, missing = %missing.missing_id, "dangling step dependency");
    }

    result.finalize();
    debug!(
        passed = result.passed,
        missing = result.missing_dependencies.len(),
        cycles = result.circular_dependencies.len(),
        unresolved = result.unresolved_semantic_deps.len(),
        "dependency check"
    );
    result
}

/// Whether a formula calls a lookup-style function.
pub fn is_lookup_formula(formula: &str) -> bool {
    let upper = formula.to_uppercase();
    upper.contains("XLOOKUP(")
        || upper.contains("VLOOKUP(")
        || upper.contains("HLOOKUP(")
        || (upper.contains("INDEX(") && upper.contains("MATCH("))
}

// ---------------------------------------------------------------------------
// SemanticResolver
// ---------------------------------------------------------------------------

struct SemanticResolver<'a> {
    model: &'a DataModel,
    field_step_ids: &'a FieldStepIdMap,
}

/// Where a dependency points.
struct Target<'t> {
    sheet: &'t str,
    field: &'t str,
}

impl<'a> SemanticResolver<'a> {
    fn calculation_chain_pass(&self, result: &mut DependencyCheckResult) {
        for entry in &self.model.calculation_chain {
            for token in &entry.dependencies {
                let Some((sheet, field)) = split_token(token) else {
                    result.warnings.push(format!(
                        "Malformed dependency '{token}' in {}!{} ignored",
                        entry.sheet, entry.field
                    ));
                    continue;
                };
                let dep = self.resolve_field(
                    &entry.sheet,
                    &entry.field,
                    Target { sheet, field },
                    SemanticDependencyType::FormulaReference,
                );
                self.record(result, dep);
            }
        }
    }

    fn lookup_pass(&self, result: &mut DependencyCheckResult) {
        for table in &self.model.tables {
            for field in &table.fields {
                let Some(formula) = field.formula.as_deref() else {
                    continue;
                };
                if !is_lookup_formula(formula) {
                    continue;
                }

                let mut seen: HashSet<(String, String)> = HashSet::new();
                for dep in self.lookup_dependencies(table, &field.name, formula) {
                    if seen.insert((dep.target_sheet.clone(), dep.target_field.clone())) {
                        self.record(result, dep);
                    }
                }
            }
        }
    }

    fn data_source_pass(&self, result: &mut DependencyCheckResult) {
        for table in &self.model.tables {
            for source in &table.depends_on {
                let dep = self.resolve_table(&table.name, "", source, SemanticDependencyType::DataSource);
                self.record(result, dep);
            }
        }
    }

    /// Lookup sources named in `formula`, other than `own` itself.
    fn lookup_dependencies(
        &self,
        own: &Table,
        source_field: &str,
        formula: &str,
    ) -> Vec<SemanticDependency> {
        let mut deps = Vec::new();
        let formula = blank_string_literals(formula);
        let formula = formula.as_str();

        for other in self.model.tables.iter().filter(|t| t.name != own.name) {
            if !formula.contains(other.name.as_str()) {
                continue;
            }
            let fields: Vec<&str> = other
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .filter(|name| formula.contains(name))
                .collect();
            if fields.is_empty() {
                deps.push(self.resolve_table(
                    &own.name,
                    source_field,
                    &other.name,
                    SemanticDependencyType::LookupSource,
                ));
            } else {
                for name in fields {
                    deps.push(self.resolve_field(
                        &own.name,
                        source_field,
                        Target {
                            sheet: &other.name,
                            field: name,
                        },
                        SemanticDependencyType::LookupSource,
                    ));
                }
            }
        }

        for caps in SHEET_PREFIX_RE.captures_iter(formula) {
            let Some(sheet) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                continue;
            };
            if sheet == own.name || self.model.table(sheet).is_some() {
                continue;
            }
            let field = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            deps.push(SemanticDependency {
                source_sheet: own.name.clone(),
                source_field: source_field.to_string(),
                target_sheet: sheet.to_string(),
                target_field: field.to_string(),
                dependency_type: SemanticDependencyType::LookupSource,
                is_resolved: false,
                resolved_step_id: None,
            });
        }

        deps
    }

    /// Field-level resolution: producing step, else existing source field.
    fn resolve_field(
        &self,
        source_sheet: &str,
        source_field: &str,
        target: Target<'_>,
        dependency_type: SemanticDependencyType,
    ) -> SemanticDependency {
        let owner = self.field_step_ids.owner(target.sheet, target.field).cloned();
        let is_resolved = owner.is_some()
            || self
                .model
                .field(target.sheet, target.field)
                .is_some_and(|f| !f.is_computed());

        SemanticDependency {
            source_sheet: source_sheet.to_string(),
            source_field: source_field.to_string(),
            target_sheet: target.sheet.to_string(),
            target_field: target.field.to_string(),
            dependency_type,
            is_resolved,
            resolved_step_id: owner,
        }
    }

    /// Table-level resolution: the table exists.
    fn resolve_table(
        &self,
        source_sheet: &str,
        source_field: &str,
        target_sheet: &str,
        dependency_type: SemanticDependencyType,
    ) -> SemanticDependency {
        SemanticDependency {
            source_sheet: source_sheet.to_string(),
            source_field: source_field.to_string(),
            target_sheet: target_sheet.to_string(),
            target_field: String::new(),
            dependency_type,
            is_resolved: self.model.table(target_sheet).is_some(),
            resolved_step_id: self.field_step_ids.any_for_table(target_sheet).cloned(),
        }
    }

    fn record(&self, result: &mut DependencyCheckResult, dep: SemanticDependency) {
        if !dep.is_resolved {
            debug!(
                sheet = %dep.source_sheet,
                field = %dep.source_field,
                token = %dep.target_token(),
                "unresolved semantic dependency"
            );
            result.warnings.push(self.explain(&dep));
            result.unresolved_semantic_deps.push(dep.clone());
        }
        result.semantic_dependencies.push(dep);
    }

    fn explain(&self, dep: &SemanticDependency) -> String {
        let source = if dep.source_field.is_empty() {
            dep.source_sheet.clone()
        } else {
            format!("{}!{}", dep.source_sheet, dep.source_field)
        };
        match self.model.table(&dep.target_sheet) {
            None => format!(
                "{source} depends on sheet '{}', which does not exist",
                dep.target_sheet
            ),
            Some(table) => match table.field(&dep.target_field) {
                None => format!(
                    "{source} depends on field '{}' in sheet '{}', which does not exist",
                    dep.target_field, dep.target_sheet
                ),
                Some(_) => format!(
                    "{source} depends on computed field {} which has no producing step",
                    dep.target_token()
                ),
            },
        }
    }
}

/// Copy of `formula` with the body of every `"..."` literal blanked out.
/// A doubled `""` inside a literal is an escaped quote.
fn blank_string_literals(formula: &str) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut in_literal = false;
    let mut chars = formula.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if in_literal && chars.peek() == Some(&'"') {
                chars.next();
                out.push_str("  ");
                continue;
            }
            in_literal = !in_literal;
            out.push('"');
        } else if in_literal {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::plan_builder::compile;
    use sheet_plan_types::{CalculationEntry, Field, StepId};

    fn orders_model() -> DataModel {
        DataModel {
            tables: vec![Table::new(
                "Orders",
                vec![
                    Field::new("Quantity"),
                    Field::new("UnitPrice"),
                    Field::new("Amount").with_formula("=Quantity*UnitPrice"),
                ],
            )],
            execution_order: vec!["Orders".into()],
            calculation_chain: vec![CalculationEntry::new(
                "Orders",
                "Amount",
                "=Quantity*UnitPrice",
                vec!["Orders!Quantity".into(), "Orders!UnitPrice".into()],
            )],
        }
    }

    fn run(model: &DataModel) -> DependencyCheckResult {
        let graph = compile("t", "general", Some(model), &PlannerConfig::default());
        check(&graph.steps, Some(model), &graph.field_step_ids, None)
    }

    #[test]
    fn test_resolved_chain_passes() {
        let result = run(&orders_model());
        assert!(result.passed);
        assert_eq!(result.semantic_dependencies.len(), 2);
        assert!(result.unresolved_semantic_deps.is_empty());
    }

    #[test]
    fn test_source_field_resolves_without_step() {
        let model = orders_model();
        let result = check(&[], Some(&model), &FieldStepIdMap::new(), None);
        assert!(result.passed);
        assert!(result
            .semantic_dependencies
            .iter()
            .all(|d| d.is_resolved && d.resolved_step_id.is_none()));
    }

    #[test]
    fn test_missing_field_unresolved() {
        let mut model = orders_model();
        model.calculation_chain[0]
            .dependencies
            .push("Orders!Discount".into());
        let result = run(&model);
        assert!(!result.passed);
        assert_eq!(result.unresolved_semantic_deps.len(), 1);
        assert!(result.warnings[0].contains("'Discount'"));
    }

    #[test]
    fn test_malformed_token_is_warning_only() {
        let mut model = orders_model();
        model.calculation_chain[0].dependencies.push("Quantity".into());
        let result = run(&model);
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_lookup_against_known_table() {
        let mut model = orders_model();
        model.tables.push(Table::new(
            "Products",
            vec![Field::new("Sku"), Field::new("Price")],
        ));
        model.tables[0]
            .fields
            .push(Field::new("ListPrice").with_formula("=XLOOKUP(Sku, Products[Sku], Products[Price])"));
        let result = run(&model);

        let lookups: Vec<_> = result
            .semantic_dependencies
            .iter()
            .filter(|d| d.dependency_type == SemanticDependencyType::LookupSource)
            .map(|d| d.target_token())
            .collect();
        assert_eq!(lookups, vec!["Products!Sku", "Products!Price"]);
        assert!(result.passed);
    }

    #[test]
    fn test_lookup_against_unknown_sheet() {
        let mut model = orders_model();
        model.tables[0]
            .fields
            .push(Field::new("Rate").with_formula("=VLOOKUP(Quantity, Rates!A:B, 2, FALSE)"));
        let result = run(&model);
        assert!(!result.passed);
        assert_eq!(result.unresolved_semantic_deps[0].target_sheet, "Rates");
        assert!(result.warnings[0].contains("sheet 'Rates'"));
    }

    #[test]
    fn test_bang_inside_string_literal_is_not_a_sheet() {
        let mut model = orders_model();
        model.tables.push(Table::new(
            "Products",
            vec![Field::new("Sku"), Field::new("Price")],
        ));
        model.tables[0].fields.push(Field::new("ListPrice").with_formula(
            "=IFERROR(XLOOKUP(Sku, Products[Sku], Products[Price]), \"Not found!\")",
        ));
        let result = run(&model);

        assert!(result.passed);
        assert!(result.unresolved_semantic_deps.is_empty());
        assert!(result.warnings.iter().all(|w| !w.contains("'found'")));
    }

    #[test]
    fn test_blank_string_literals_keeps_offsets() {
        let formula = r#"=IF(A1="say ""Hi!""", Rates!B1, "x!")"#;
        let blanked = blank_string_literals(formula);
        assert_eq!(blanked.len(), formula.len());
        assert!(blanked.contains("Rates!B1"));
        assert!(!blanked.contains("Hi"));
        assert!(!blanked.contains("x!"));
    }

    #[test]
    fn test_table_only_lookup_match() {
        let mut model = orders_model();
        model.tables.push(Table::new("Rates", vec![Field::new("Code")]));
        model.tables[0].fields.push(
            Field::new("Rate").with_formula("=INDEX(Rates[#Data], MATCH(Quantity, Rates[#Headers], 0))"),
        );
        let result = run(&model);
        let dep = result
            .semantic_dependencies
            .iter()
            .find(|d| d.dependency_type == SemanticDependencyType::LookupSource)
            .unwrap();
        assert_eq!(dep.target_field, "");
        assert!(dep.is_resolved);
    }

    #[test]
    fn test_upstream_merged_verbatim() {
        let upstream = ModelValidationResult {
            is_valid: false,
            errors: vec!["bad".into()],
            warnings: vec!["meh".into()],
            circular_dependencies: vec![vec!["Orders!A".into(), "Orders!B".into()]],
        };
        let result = check(&[], None, &FieldStepIdMap::new(), Some(&upstream));
        assert!(!result.passed);
        assert_eq!(result.errors, vec!["bad".to_string()]);
        assert_eq!(result.warnings, vec!["meh".to_string()]);
    }

    #[test]
    fn test_dangling_step_dependency_fails() {
        let steps = vec![Step::new(
            "s1",
            1,
            sheet_plan_types::StepPhase::Verify,
            sheet_plan_types::actions::VERIFY_RESULTS,
        )
        .with_depends_on(vec![StepId::from("s0")])];
        let result = check(&steps, None, &FieldStepIdMap::new(), None);
        assert!(!result.passed);
        assert_eq!(result.missing_dependencies.len(), 1);
    }

    #[test]
    fn test_lookup_detection() {
        assert!(is_lookup_formula("=xlookup(a,b,c)"));
        assert!(is_lookup_formula("=INDEX(A:A, MATCH(1, B:B, 0))"));
        assert!(!is_lookup_formula("=INDEX(A:A, 2)"));
    }
}
