//! Data model types produced by the external modeler.
//!
//! A `DataModel` is created once per task and is read-only from the
//! planner's point of view. `execution_order` and `calculation_chain` arrive
//! already topologically sorted; the planner validates references within
//! them but never re-sorts.

use serde::{Deserialize, Serialize};

// ============================================================================
// DATA MODEL
// ============================================================================

/// Declarative description of the workbook a task should produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModel {
    /// Tables in declaration order.
    #[serde(default)]
    pub tables: Vec<Table>,

    /// Table names in creation order.
    #[serde(default)]
    pub execution_order: Vec<String>,

    /// One entry per computed field, dependencies first.
    #[serde(default)]
    pub calculation_chain: Vec<CalculationEntry>,
}

impl DataModel {
    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Look up a field by table and field name.
    pub fn field(&self, table: &str, field: &str) -> Option<&Field> {
        self.table(table).and_then(|t| t.field(field))
    }

    /// Whether the model declares no tables at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A sheet-backed table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,

    #[serde(default)]
    pub fields: Vec<Field>,

    /// Names of tables that must exist before this one is created.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            depends_on: Vec::new(),
        }
    }

    pub fn with_depends_on(mut self, tables: Vec<String>) -> Self {
        self.depends_on = tables;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 0-based position of a field within the table.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// A column of a table.
///
/// `formula` is written in logical form: it names other fields, never cell
/// addresses (`=Quantity*UnitPrice`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// A source (non-computed) field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validation = Some(rule);
        self
    }

    pub fn is_computed(&self) -> bool {
        self.formula.is_some()
    }
}

// ============================================================================
// VALIDATION RULES
// ============================================================================

/// Data-validation rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub kind: ValidationKind,

    /// Allowed values for `list` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Logical formula for `custom` rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(default = "default_true")]
    pub allow_blank: bool,

    /// Message shown when input is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationRule {
    pub fn list(values: Vec<String>) -> Self {
        Self {
            kind: ValidationKind::List,
            values,
            min: None,
            max: None,
            formula: None,
            allow_blank: true,
            message: None,
        }
    }

    pub fn between(kind: ValidationKind, min: f64, max: f64) -> Self {
        Self {
            kind,
            values: Vec::new(),
            min: Some(min),
            max: Some(max),
            formula: None,
            allow_blank: true,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    List,
    WholeNumber,
    Decimal,
    Date,
    TextLength,
    Custom,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// CALCULATION CHAIN
// ============================================================================

/// One computed field in the pre-sorted calculation chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationEntry {
    pub sheet: String,
    pub field: String,
    pub formula: String,

    /// Logical dependency tokens of the form `Sheet!Field`.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl CalculationEntry {
    pub fn new(
        sheet: impl Into<String>,
        field: impl Into<String>,
        formula: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            field: field.into(),
            formula: formula.into(),
            dependencies,
        }
    }
}

// ============================================================================
// UPSTREAM VERDICT
// ============================================================================

/// Verdict of the external modeler's own validator.
///
/// The planner merges its circular dependencies, errors and warnings into
/// its dependency check verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelValidationResult {
    #[serde(default = "default_true")]
    pub is_valid: bool,

    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,

    /// Each cycle as a list of `Sheet!Field` names.
    #[serde(default)]
    pub circular_dependencies: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_model_deserializes_camel_case() {
        let json = r#"{
            "tables": [{
                "name": "Orders",
                "fields": [
                    {"name": "Quantity"},
                    {"name": "Amount", "formula": "=Quantity*UnitPrice"}
                ],
                "dependsOn": []
            }],
            "executionOrder": ["Orders"],
            "calculationChain": [{
                "sheet": "Orders",
                "field": "Amount",
                "formula": "=Quantity*UnitPrice",
                "dependencies": ["Orders!Quantity"]
            }]
        }"#;
        let model: DataModel = serde_json::from_str(json).expect("deserialize");
        assert_eq!(model.execution_order, vec!["Orders".to_string()]);
        assert!(model.field("Orders", "Amount").expect("Amount").is_computed());
        assert!(!model.field("Orders", "Quantity").expect("Quantity").is_computed());
        assert_eq!(model.calculation_chain[0].dependencies.len(), 1);
    }

    #[test]
    fn test_validation_rule_allow_blank_defaults_true() {
        let rule: ValidationRule =
            serde_json::from_str(r#"{"kind": "list", "values": ["A", "B"]}"#).expect("rule");
        assert_eq!(rule.kind, ValidationKind::List);
        assert!(rule.allow_blank);
    }

    #[test]
    fn test_field_index_follows_declaration_order() {
        let table = Table::new(
            "Orders",
            vec![Field::new("Quantity"), Field::new("UnitPrice")],
        );
        assert_eq!(table.field_index("UnitPrice"), Some(1));
        assert_eq!(table.field_index("Missing"), None);
    }
}
