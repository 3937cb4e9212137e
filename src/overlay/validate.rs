//! Pre-flight validation of the index table against the source workspace.
//!
//! Validation is exhaustive: every discoverable problem is collected and
//! logged before the caller decides whether to abort. Nothing is written.
use super::finalize::LOC_ERROR_FIELD;
use super::index::IndexTable;
use super::ControlFields;
use crate::table::{TableError, Workspace};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Output field name appended by the final formatter.
pub const LENGTH_FIELD: &str = "Length";

/// A single schema problem found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationProblem {
    EmptyIndex,
    MissingFeatureClass {
        feature_class: String,
    },
    MissingInputField {
        feature_class: String,
        field: String,
    },
    MissingControlField {
        feature_class: String,
        field: String,
    },
    InvalidOutputField {
        feature_class: String,
        field: String,
        reason: String,
    },
    ConflictingOutputField {
        field: String,
        feature_classes: Vec<String>,
    },
    DuplicateOutputField {
        feature_class: String,
        field: String,
    },
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationProblem::EmptyIndex => write!(f, "index table has no rows"),
            ValidationProblem::MissingFeatureClass { feature_class } => {
                write!(f, "feature class {feature_class} does not exist in the workspace")
            }
            ValidationProblem::MissingInputField {
                feature_class,
                field,
            } => write!(f, "field {field} does not exist on {feature_class}"),
            ValidationProblem::MissingControlField {
                feature_class,
                field,
            } => write!(f, "control field {field} does not exist on {feature_class}"),
            ValidationProblem::InvalidOutputField {
                feature_class,
                field,
                reason,
            } => write!(f, "output field {field:?} for {feature_class} {reason}"),
            ValidationProblem::ConflictingOutputField {
                field,
                feature_classes,
            } => write!(
                f,
                "output field {field} is declared by several feature classes: {}",
                feature_classes.join(", ")
            ),
            ValidationProblem::DuplicateOutputField {
                feature_class,
                field,
            } => write!(f, "output field {field} is mapped more than once for {feature_class}"),
        }
    }
}

/// Result of a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub feature_classes_checked: usize,
    pub rows_checked: usize,
    pub problems: Vec<ValidationProblem>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.problems.len()
    }

    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    fn push(&mut self, problem: ValidationProblem) {
        tracing::warn!(%problem, "validation problem");
        self.problems.push(problem);
    }
}

/// Check the index table against the workspace schema.
///
/// Only I/O failures reading the workspace are returned as errors; schema
/// problems are collected in the report.
pub fn validate_index(
    index: &IndexTable,
    workspace: &Workspace,
    fields: &ControlFields,
) -> Result<ValidationReport, TableError> {
    let mut report = ValidationReport {
        rows_checked: index.rows.len(),
        ..ValidationReport::default()
    };
    if index.is_empty() {
        report.push(ValidationProblem::EmptyIndex);
        return Ok(report);
    }

    let plans = index.feature_classes();
    report.feature_classes_checked = plans.len();
    let available = workspace.list_tables()?;
    let mut output_owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut output_spelling: HashMap<String, String> = HashMap::new();

    for plan in &plans {
        let mut plan_outputs = HashSet::new();
        for (_, output) in &plan.mappings {
            if let Some(reason) = invalid_output_reason(output, fields) {
                report.push(ValidationProblem::InvalidOutputField {
                    feature_class: plan.name.clone(),
                    field: output.clone(),
                    reason,
                });
                continue;
            }
            let key = output.to_ascii_uppercase();
            if !plan_outputs.insert(key.clone()) {
                report.push(ValidationProblem::DuplicateOutputField {
                    feature_class: plan.name.clone(),
                    field: output.clone(),
                });
                continue;
            }
            output_spelling.entry(key.clone()).or_insert_with(|| output.clone());
            let owners = output_owners.entry(key).or_default();
            if !owners.contains(&plan.name) {
                owners.push(plan.name.clone());
            }
        }

        let Some(stored) = available
            .iter()
            .find(|name| name.eq_ignore_ascii_case(&plan.name))
        else {
            report.push(ValidationProblem::MissingFeatureClass {
                feature_class: plan.name.clone(),
            });
            continue;
        };
        let table = workspace.read_table(stored)?;

        for (input, _) in &plan.mappings {
            if !table.has_field(input) {
                report.push(ValidationProblem::MissingInputField {
                    feature_class: plan.name.clone(),
                    field: input.clone(),
                });
            }
        }
        for control in fields.all() {
            if !table.has_field(control) {
                report.push(ValidationProblem::MissingControlField {
                    feature_class: plan.name.clone(),
                    field: control.to_string(),
                });
            }
        }
    }

    for (key, owners) in output_owners {
        if owners.len() > 1 {
            let field = output_spelling.remove(&key).unwrap_or(key);
            report.push(ValidationProblem::ConflictingOutputField {
                field,
                feature_classes: owners,
            });
        }
    }

    tracing::info!(
        feature_classes = report.feature_classes_checked,
        rows = report.rows_checked,
        errors = report.error_count(),
        "index validation complete"
    );
    Ok(report)
}

fn invalid_output_reason(output: &str, fields: &ControlFields) -> Option<String> {
    if output.trim().is_empty() {
        return Some("is empty".to_string());
    }
    if fields
        .measure_and_route()
        .iter()
        .any(|control| control.eq_ignore_ascii_case(output))
    {
        return Some("collides with a control field".to_string());
    }
    if output.eq_ignore_ascii_case(LENGTH_FIELD) || output.eq_ignore_ascii_case(LOC_ERROR_FIELD) {
        return Some(format!("collides with the computed {output} field"));
    }
    None
}
