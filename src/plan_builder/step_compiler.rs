//! Step graph compiler - `DataModel` → ordered steps + field ownership.
//!
//! ## Phases
//!
//! ```text
//! 1. Structure   per table:  create_sheet ──► write_headers   (fields → headers step)
//! 2. Formulas    per calculation-chain entry:  set_formula    (field → formula step)
//! 3. Validation  per validated field:  add_validation ──► current field owner
//! 4. Verify      once, if any formulas:  verify_results ──► all formula steps
//! ```
//!
//! Phases always run in this order, so emission order already respects every
//! `depends_on` edge the compiler creates. Step ids are deterministic:
//! `s{order}_{action}_{sheet}[_{field}]`.
//!
//! The [`FieldStepIdMap`] lives only for one `compile` call and is handed back
//! with the steps.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use sheet_plan_types::{
    actions, CalculationEntry, DataModel, FieldStepIdMap, Step, StepId, StepPhase,
    SuccessCondition, Table, WritePreview,
};

use super::resolver::{resolve_precise_dependencies, resolve_table_dependencies};
use crate::config::PlannerConfig;
use crate::reference::{col_to_name, CellRange, ReferenceTranslator};

/// Output of [`compile`].
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    /// Steps in emission order.
    pub steps: Vec<Step>,
    pub field_step_ids: FieldStepIdMap,
    /// Table names in the order their structure was emitted.
    pub tables: Vec<String>,
}

impl CompiledGraph {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn formula_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| s.action == actions::SET_FORMULA)
    }
}

/// Compile a data model into an ordered step graph.
///
/// Without a model no steps are emitted; the caller turns that into a
/// clarification request.
pub fn compile(
    task_description: &str,
    task_type: &str,
    data_model: Option<&DataModel>,
    config: &PlannerConfig,
) -> CompiledGraph {
    let Some(model) = data_model else {
        debug!(task_type, "no data model supplied, emitting no steps");
        return CompiledGraph::default();
    };

    let mut builder = GraphBuilder::new(model, config);
    builder.structure_phase();
    builder.formula_phase();
    builder.validation_phase();
    builder.verify_phase();

    let graph = builder.finish();
    info!(
        task_type,
        task_chars = task_description.chars().count(),
        tables = graph.tables.len(),
        steps = graph.steps.len(),
        formulas = graph.formula_steps().count(),
        "compiled step graph"
    );
    graph
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

struct GraphBuilder<'a> {
    model: &'a DataModel,
    config: &'a PlannerConfig,
    steps: Vec<Step>,
    field_step_ids: FieldStepIdMap,
    tables: Vec<&'a Table>,
    formula_ids: Vec<StepId>,
}

impl<'a> GraphBuilder<'a> {
    fn new(model: &'a DataModel, config: &'a PlannerConfig) -> Self {
        Self {
            model,
            config,
            steps: Vec::new(),
            field_step_ids: FieldStepIdMap::new(),
            tables: ordered_tables(model),
            formula_ids: Vec::new(),
        }
    }

    fn next_order(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    fn push(&mut self, step: Step) -> StepId {
        let id = step.id.clone();
        self.steps.push(step);
        id
    }

    // -- Phase 1 --------------------------------------------------------

    fn structure_phase(&mut self) {
        for table in self.tables.clone() {
            let sheet = table.name.as_str();

            let order = self.next_order();
            let create_deps = resolve_table_dependencies(&table.depends_on, &self.field_step_ids);
            let create = Step::new(
                step_id(order, actions::CREATE_SHEET, sheet, None),
                order,
                StepPhase::CreateStructure,
                actions::CREATE_SHEET,
            )
            .with_description(format!("Create sheet '{sheet}'"))
            .with_parameters(json!({ "sheet": sheet }))
            .with_depends_on(create_deps)
            .writing(WritePreview::new(sheet))
            .with_success_condition(SuccessCondition::SheetExists {
                sheet: sheet.to_string(),
            });
            let create_id = self.push(create);

            let headers = table.field_names();
            let range = CellRange::row_span(1, headers.len() as u32);
            let order = self.next_order();
            let write_headers = Step::new(
                step_id(order, actions::WRITE_HEADERS, sheet, None),
                order,
                StepPhase::CreateStructure,
                actions::WRITE_HEADERS,
            )
            .with_description(format!(
                "Write {} header(s) to '{sheet}'",
                headers.len()
            ))
            .with_parameters(json!({
                "sheet": sheet,
                "range": range.to_string(),
                "headers": headers,
            }))
            .with_depends_on(vec![create_id])
            .writing(WritePreview::new(range.to_string()).with_estimated_cells(headers.len() as u64))
            .with_success_condition(SuccessCondition::HeadersMatch {
                sheet: sheet.to_string(),
                headers: headers.clone(),
            });
            let headers_id = self.push(write_headers);

            for field in &table.fields {
                self.field_step_ids
                    .register(sheet, field.name.as_str(), headers_id.clone());
            }
        }
    }

    // -- Phase 2 --------------------------------------------------------

    fn formula_phase(&mut self) {
        let model = self.model;
        for entry in &model.calculation_chain {
            self.emit_formula(entry);
        }

        for table in &self.tables {
            for field in table.fields.iter().filter(|f| f.is_computed()) {
                let in_chain = self
                    .model
                    .calculation_chain
                    .iter()
                    .any(|e| e.sheet == table.name && e.field == field.name);
                if !in_chain {
                    warn!(
                        sheet = %table.name,
                        field = %field.name,
                        "computed field missing from calculation chain"
                    );
                }
            }
        }
    }

    fn emit_formula(&mut self, entry: &CalculationEntry) {
        let sheet = entry.sheet.as_str();
        let field = entry.field.as_str();
        let model = self.model;
        let table = model.table(sheet);
        if table.is_none() {
            warn!(sheet, field, "calculation entry targets an unknown table");
        }

        let translator = ReferenceTranslator::new(
            table.map(Table::field_names).unwrap_or_default(),
        );
        let translated = translator.translate(&entry.formula);
        let column = table
            .and_then(|t| t.field_index(field))
            .map(|idx| col_to_name(idx as u32));

        let mut deps = resolve_precise_dependencies(&entry.dependencies, &self.field_step_ids);
        if let Some(owner) = self.field_step_ids.owner(sheet, field) {
            if !deps.contains(owner) {
                deps.push(owner.clone());
            }
        }

        let preview = match &column {
            Some(col) => WritePreview::new(format!("{col}2:{col}")),
            None => WritePreview::new(sheet),
        };

        let order = self.next_order();
        let step = Step::new(
            step_id(order, actions::SET_FORMULA, sheet, Some(field)),
            order,
            StepPhase::SetFormulas,
            actions::SET_FORMULA,
        )
        .with_description(format!("Set formula for '{sheet}'.'{field}'"))
        .with_parameters(json!({
            "sheet": sheet,
            "field": field,
            "column": column,
            "logicalFormula": translated,
            "originalFormula": entry.formula,
            "referenceMode": "structured",
        }))
        .with_depends_on(deps)
        .writing(preview)
        .with_success_condition(SuccessCondition::NoErrorValues {
            sheet: sheet.to_string(),
            column: column.clone(),
            sample_count: self.config.formula_sample_count,
        });

        let id = self.push(step);
        debug!(sheet, field, step_id = %id, formula = %translated, "formula step");
        self.field_step_ids.register(sheet, field, id.clone());
        self.formula_ids.push(id);
    }

    // -- Phase 3 --------------------------------------------------------

    fn validation_phase(&mut self) {
        for table in self.tables.clone() {
            let sheet = table.name.as_str();
            let translator = ReferenceTranslator::new(table.field_names());

            for (idx, field) in table.fields.iter().enumerate() {
                let Some(rule) = &field.validation else {
                    continue;
                };
                let mut rule = rule.clone();
                if let Some(formula) = &rule.formula {
                    rule.formula = Some(translator.translate(formula));
                }

                let column = col_to_name(idx as u32);
                let deps: Vec<StepId> = self
                    .field_step_ids
                    .owner(sheet, &field.name)
                    .cloned()
                    .into_iter()
                    .collect();

                let order = self.next_order();
                let step = Step::new(
                    step_id(order, actions::ADD_VALIDATION, sheet, Some(&field.name)),
                    order,
                    StepPhase::AddValidation,
                    actions::ADD_VALIDATION,
                )
                .with_description(format!("Add validation to '{sheet}'.'{}'", field.name))
                .with_parameters(json!({
                    "sheet": sheet,
                    "field": field.name,
                    "column": column,
                    "rule": serde_json::to_value(&rule).unwrap_or(Value::Null),
                }))
                .with_depends_on(deps)
                .writing(WritePreview::new(format!("{column}2:{column}")))
                .with_success_condition(SuccessCondition::ToolSuccess);
                self.push(step);
            }
        }
    }

    // -- Phase 4 --------------------------------------------------------

    fn verify_phase(&mut self) {
        if self.formula_ids.is_empty() {
            return;
        }

        let checks: Vec<Value> = self
            .steps
            .iter()
            .filter(|s| s.action == actions::SET_FORMULA)
            .map(|s| json!({ "sheet": s.sheet(), "column": s.param_str("column") }))
            .collect();

        let order = self.next_order();
        let sheet = self
            .steps
            .iter()
            .find(|s| s.action == actions::SET_FORMULA)
            .and_then(Step::sheet)
            .unwrap_or("workbook")
            .to_string();
        let step = Step::new(
            step_id(order, actions::VERIFY_RESULTS, &sheet, None),
            order,
            StepPhase::Verify,
            actions::VERIFY_RESULTS,
        )
        .with_description(format!(
            "Verify {} computed column(s) contain no error values",
            checks.len()
        ))
        .with_parameters(json!({
            "checks": checks,
            "sampleCount": self.config.formula_sample_count,
        }))
        .with_depends_on(self.formula_ids.clone())
        .with_success_condition(SuccessCondition::Custom {
            description: "No error values in any computed column".to_string(),
            check: Value::Array(checks),
        });
        self.push(step);
    }

    fn finish(self) -> CompiledGraph {
        CompiledGraph {
            steps: self.steps,
            field_step_ids: self.field_step_ids,
            tables: self.tables.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

/// `execution_order` first, then any table it leaves out, each at most once.
fn ordered_tables(model: &DataModel) -> Vec<&Table> {
    let mut ordered: Vec<&Table> = Vec::with_capacity(model.tables.len());

    for name in &model.execution_order {
        match model.table(name) {
            Some(table) if !ordered.iter().any(|t| t.name == table.name) => ordered.push(table),
            Some(_) => {}
            None => warn!(sheet = %name, "execution order names an unknown table"),
        }
    }

    for table in &model.tables {
        if !ordered.iter().any(|t| t.name == table.name) {
            warn!(sheet = %table.name, "table missing from execution order, compiling last");
            ordered.push(table);
        }
    }

    ordered
}

/// Deterministic compiler step id.
fn step_id(order: u32, action: &str, sheet: &str, field: Option<&str>) -> StepId {
    match field {
        Some(field) => StepId::new(format!(
            "s{order}_{action}_{}_{}",
            id_part(sheet),
            id_part(field)
        )),
        None => StepId::new(format!("s{order}_{action}_{}", id_part(sheet))),
    }
}

fn id_part(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheet_plan_types::{Field, ValidationRule};

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

    #[test]
    fn test_no_model_no_steps() {
        let graph = compile("anything", "general", None, &PlannerConfig::default());
        assert!(graph.is_empty());
        assert!(graph.field_step_ids.is_empty());
    }

    #[test]
    fn test_orders_graph_shape() {
        let model = orders_model();
        let graph = compile("orders", "general", Some(&model), &PlannerConfig::default());

        let kinds: Vec<&str> = graph.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                actions::CREATE_SHEET,
                actions::WRITE_HEADERS,
                actions::SET_FORMULA,
                actions::VERIFY_RESULTS
            ]
        );

        let headers_id = graph.steps[1].id.clone();
        let formula = &graph.steps[2];
        assert_eq!(formula.depends_on, vec![headers_id.clone()]);
        assert_eq!(formula.param_str("logicalFormula"), Some("=@[Quantity]*@[UnitPrice]"));
        assert_eq!(formula.param_str("column"), Some("C"));
        assert_eq!(graph.steps[3].depends_on, vec![formula.id.clone()]);

        assert_eq!(graph.field_step_ids.owner("Orders", "Quantity"), Some(&headers_id));
        assert_eq!(graph.field_step_ids.owner("Orders", "Amount"), Some(&formula.id));
    }

    #[test]
    fn test_step_ids_are_deterministic() {
        let model = orders_model();
        let a = compile("t", "general", Some(&model), &PlannerConfig::default());
        let b = compile("t", "general", Some(&model), &PlannerConfig::default());
        let ids_a: Vec<_> = a.steps.iter().map(|s| s.id.clone()).collect();
        let ids_b: Vec<_> = b.steps.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a[0], "s1_create_sheet_Orders");
        assert_eq!(ids_a[2], "s3_set_formula_Orders_Amount");
    }

    #[test]
    fn test_chained_formula_depends_on_formula_step() {
        let mut model = orders_model();
        model.tables[0].fields.push(Field::new("Tax").with_formula("=Amount*0.1"));
        model.calculation_chain.push(CalculationEntry::new(
            "Orders",
            "Tax",
            "=Amount*0.1",
            vec!["Orders!Amount".into()],
        ));
        let graph = compile("t", "general", Some(&model), &PlannerConfig::default());

        let amount_id = graph.field_step_ids.owner("Orders", "Amount").unwrap().clone();
        let headers_id = graph.steps[1].id.clone();
        let tax = graph
            .formula_steps()
            .find(|s| s.param_str("field") == Some("Tax"))
            .unwrap();
        assert_eq!(tax.depends_on, vec![amount_id, headers_id]);
    }

    #[test]
    fn test_table_dependency_and_missing_order_entry() {
        let model = DataModel {
            tables: vec![
                Table::new("Products", vec![Field::new("Sku"), Field::new("Price")]),
                Table::new("Orders", vec![Field::new("Sku")])
                    .with_depends_on(vec!["Products".into()]),
            ],
            execution_order: vec!["Products".into(), "Ghost".into()],
            calculation_chain: vec![],
        };
        let graph = compile("t", "general", Some(&model), &PlannerConfig::default());

        assert_eq!(graph.steps.len(), 4);
        assert_eq!(graph.tables, vec!["Products".to_string(), "Orders".to_string()]);
        let products_headers = graph.steps[1].id.clone();
        assert_eq!(graph.steps[2].depends_on, vec![products_headers]);
        assert_eq!(graph.field_step_ids.len(), 3);
    }

    #[test]
    fn test_validation_depends_on_current_owner() {
        let mut model = orders_model();
        model.tables[0].fields[0] =
            Field::new("Quantity").with_validation(ValidationRule::list(vec!["1".into()]));
        let graph = compile("t", "general", Some(&model), &PlannerConfig::default());

        let validation = graph
            .steps
            .iter()
            .find(|s| s.action == actions::ADD_VALIDATION)
            .unwrap();
        assert_eq!(validation.depends_on, vec![graph.steps[1].id.clone()]);
        assert_eq!(validation.phase, StepPhase::AddValidation);
        assert!(validation.is_write_operation);
        // Verify still comes last.
        assert_eq!(graph.steps.last().unwrap().action, actions::VERIFY_RESULTS);
    }

    #[test]
    fn test_sample_count_from_config() {
        let config = PlannerConfig {
            formula_sample_count: 9,
            ..PlannerConfig::default()
        };
        let graph = compile("t", "general", Some(&orders_model()), &config);
        match &graph.steps[2].success_condition {
            SuccessCondition::NoErrorValues { sample_count, .. } => assert_eq!(*sample_count, 9),
            other => panic!("unexpected condition {other:?}"),
        }
    }
}
