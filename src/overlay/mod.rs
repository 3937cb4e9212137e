//! Route-event overlay pipeline.
//!
//! Copies index-declared fields from each source feature class into staged
//! event tables, dissolves them, unions them in overlay order, and formats a
//! flattened output table plus a located output feature class.
//!
//! The pipeline is strictly sequential. Validation runs before anything is
//! written; every later step is fail-fast and leaves the staging workspace as
//! it was at the point of failure.
use crate::config::OverlayConfig;
use crate::staging::{create_staging_workspace, stamped_name, write_staged_json, RunStamp};
use crate::table::{read_table_file, Field, FieldType, Filter, Table, TableError, Workspace};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

pub mod dissolve;
pub mod events;
pub mod finalize;
pub mod index;
pub mod merge;
pub mod temporal;
pub mod validate;

use dissolve::dissolve_events;
use events::{build_field_mapping, copy_events, normalize_nulls, round_measures};
use finalize::{finalize, FinalizeOptions};
use index::{FeatureClassPlan, IndexTable};
use merge::{merge_ordered, overlay_order, MergeStep};
use temporal::TemporalFilter;
use validate::validate_index;

/// Relative path of the run report inside the staging workspace.
pub const RUN_REPORT_REL: &str = "meta/run_report.json";

/// Fatal overlay failures.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("could not read index table {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("index validation failed with {count} error(s)")]
    Validation { count: usize },
    #[error("field mapping failed for {feature_class}: {reason}")]
    Mapping {
        feature_class: String,
        reason: String,
    },
    #[error("{step} failed: {reason}")]
    Conversion { step: String, reason: String },
    #[error("could not create staging workspace under {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

pub(crate) fn conversion(step: impl Into<String>, err: impl fmt::Display) -> OverlayError {
    OverlayError::Conversion {
        step: step.into(),
        reason: err.to_string(),
    }
}

/// Non-fatal conditions recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayWarning {
    /// No event rows survived the filters; the feature class is skipped from
    /// the union chain and its fields are carried as nulls.
    EmptyInput { feature_class: String },
    /// Rows left out because a from-date or to-date could not be read.
    UnreadableDates { feature_class: String, rows: usize },
}

impl fmt::Display for OverlayWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayWarning::EmptyInput { feature_class } => {
                write!(f, "{feature_class} produced no events and was skipped")
            }
            OverlayWarning::UnreadableDates {
                feature_class,
                rows,
            } => write!(
                f,
                "{feature_class} has {rows} row(s) with unreadable dates that were left out"
            ),
        }
    }
}

/// Names of the route id, measure, and date fields present on every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFields {
    pub route_id: String,
    pub from_measure: String,
    pub to_measure: String,
    pub from_date: String,
    pub to_date: String,
}

impl Default for ControlFields {
    fn default() -> Self {
        Self {
            route_id: "RouteID".to_string(),
            from_measure: "FromMeasure".to_string(),
            to_measure: "ToMeasure".to_string(),
            from_date: "FromDate".to_string(),
            to_date: "ToDate".to_string(),
        }
    }
}

impl ControlFields {
    pub fn all(&self) -> [&str; 5] {
        [
            &self.route_id,
            &self.from_measure,
            &self.to_measure,
            &self.from_date,
            &self.to_date,
        ]
    }

    /// Fields carried into every event table.
    pub fn measure_and_route(&self) -> [&str; 3] {
        [&self.route_id, &self.from_measure, &self.to_measure]
    }

    pub fn measures(&self) -> [&str; 2] {
        [&self.from_measure, &self.to_measure]
    }

    pub fn is_measure(&self, name: &str) -> bool {
        self.measures()
            .iter()
            .any(|measure| measure.eq_ignore_ascii_case(name))
    }
}

/// Inputs for one overlay run.
#[derive(Debug, Clone)]
pub struct OverlayRequest {
    pub index_path: PathBuf,
    pub workspace: PathBuf,
    pub routes_path: PathBuf,
    pub out_dir: PathBuf,
    pub config: OverlayConfig,
    /// Date at which temporal validity is evaluated.
    pub at: NaiveDateTime,
    pub stamp: RunStamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureClassSummary {
    pub name: String,
    pub overlay_order: f64,
    pub dissolve_fields: String,
    pub event_rows: usize,
    pub dissolved_rows: usize,
    pub unreadable_date_rows: usize,
}

/// Summary of a completed run, also written to the staging workspace.
#[derive(Debug, Clone, Serialize)]
pub struct OverlayReport {
    pub stamp: String,
    pub target_date: String,
    pub staging_workspace: PathBuf,
    pub output_table: String,
    pub output_feature_class: String,
    pub feature_classes: Vec<FeatureClassSummary>,
    pub merge_steps: Vec<MergeStep>,
    pub warnings: Vec<OverlayWarning>,
    pub slivers_removed: usize,
    pub output_rows: usize,
    pub elapsed_ms: u128,
}

struct StagedFeatureClass {
    summary: FeatureClassSummary,
    dissolved: Option<Table>,
    schema: Vec<Field>,
}

/// Run the full overlay pipeline.
pub fn run_overlay(request: &OverlayRequest) -> Result<OverlayReport, OverlayError> {
    let started = Instant::now();
    let config = &request.config;
    let fields = config.control_fields();

    let index = IndexTable::load(&request.index_path).map_err(|source| OverlayError::Index {
        path: request.index_path.clone(),
        source,
    })?;
    let source = Workspace::open(&request.workspace)?;
    let validation = validate_index(&index, &source, &fields)?;
    if !validation.is_valid() {
        return Err(OverlayError::Validation {
            count: validation.error_count(),
        });
    }
    let routes = read_table_file(&request.routes_path)?;
    for control in [&fields.route_id, &fields.from_date, &fields.to_date] {
        routes.require_field(control)?;
    }
    let sql = config.sql_filter.as_deref().map(Filter::parse).transpose()?;
    if let Some(filter) = &sql {
        tracing::info!(filter = %filter.source(), "applying row filter to every source");
    }
    let temporal = TemporalFilter::new(request.at, &fields.from_date, &fields.to_date);

    let staging =
        create_staging_workspace(&request.out_dir, &config.staging_base_name, &request.stamp)
            .map_err(|source| OverlayError::Staging {
                path: request.out_dir.clone(),
                source,
            })?;

    let plans = index.feature_classes();
    let order = overlay_order(&plans);
    let mut staged = Vec::with_capacity(plans.len());
    for plan in &plans {
        staged.push(stage_feature_class(
            plan,
            &source,
            &staging,
            &fields,
            &temporal,
            sql.as_ref(),
            config.decimal_places,
        )?);
    }

    let mut warnings = Vec::new();
    let mut ordered = Vec::with_capacity(order.len());
    for position in &order {
        let unreadable = staged[*position].summary.unreadable_date_rows;
        if unreadable > 0 {
            warnings.push(OverlayWarning::UnreadableDates {
                feature_class: plans[*position].name.clone(),
                rows: unreadable,
            });
        }
        match staged[*position].dissolved.take() {
            Some(table) => ordered.push(table),
            None => warnings.push(OverlayWarning::EmptyInput {
                feature_class: plans[*position].name.clone(),
            }),
        }
    }
    for warning in &warnings {
        tracing::warn!(%warning, "overlay warning");
    }

    let (accumulator, merge_steps) = merge_ordered(ordered, &fields, |table| {
        staging.write_table(table)?;
        Ok(())
    })?;
    let mut accumulator = match accumulator {
        Some(table) => table,
        None => empty_accumulator(&staged, &fields),
    };

    let mut output_fields = Vec::new();
    for position in &order {
        for output in plans[*position].output_fields() {
            if !accumulator.has_field(&output) {
                let field_type = staged[*position]
                    .schema
                    .iter()
                    .find(|field| field.is_named(&output))
                    .map_or(FieldType::Text, |field| field.field_type);
                tracing::debug!(field = %output, %field_type, "adding empty output field");
                accumulator.add_field(Field::new(output.clone(), field_type))?;
            }
            output_fields.push(output);
        }
    }

    let table_name = stamped_name(&format!("{}_TBL", config.output_prefix), &request.stamp);
    let feature_class_name = stamped_name(&format!("{}_FC", config.output_prefix), &request.stamp);
    let output = finalize(
        accumulator,
        &routes,
        &temporal,
        &fields,
        &FinalizeOptions {
            table_name: &table_name,
            feature_class_name: &feature_class_name,
            output_fields: &output_fields,
            decimal_places: config.decimal_places,
        },
    )?;

    let outputs = Workspace::open_or_create(&request.out_dir)?;
    outputs.write_table(&output.table)?;
    outputs.write_table(&output.feature_class)?;
    outputs.export_csv(&output.feature_class)?;

    let report = OverlayReport {
        stamp: request.stamp.suffix(),
        target_date: request.at.format("%Y-%m-%d %H:%M:%S").to_string(),
        staging_workspace: staging.root().to_path_buf(),
        output_table: table_name,
        output_feature_class: feature_class_name,
        feature_classes: staged.into_iter().map(|staged| staged.summary).collect(),
        merge_steps,
        warnings,
        slivers_removed: output.slivers_removed,
        output_rows: output.feature_class.len(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    write_staged_json(&staging, RUN_REPORT_REL, &report)?;
    tracing::info!(
        output_rows = report.output_rows,
        slivers_removed = report.slivers_removed,
        elapsed_ms = report.elapsed_ms,
        "overlay complete"
    );
    Ok(report)
}

/// Copy, normalize, round, and dissolve one feature class into staging.
fn stage_feature_class(
    plan: &FeatureClassPlan,
    source: &Workspace,
    staging: &Workspace,
    fields: &ControlFields,
    temporal: &TemporalFilter,
    sql: Option<&Filter>,
    decimal_places: u32,
) -> Result<StagedFeatureClass, OverlayError> {
    let table = source.read_table(&plan.name)?;
    let mappings = build_field_mapping(plan, &table, fields)?;
    let valid = temporal
        .bind(&table)
        .map_err(|err| conversion(format!("temporal filter on {}", plan.name), err))?;
    let selected = sql
        .map(|filter| filter.bind(&table))
        .transpose()
        .map_err(|err| conversion(format!("SQL filter on {}", plan.name), err))?;

    let unreadable_date_rows = valid.unreadable_rows(&table);
    if unreadable_date_rows > 0 {
        tracing::warn!(
            feature_class = %plan.name,
            rows = unreadable_date_rows,
            from_field = %fields.from_date,
            to_field = %fields.to_date,
            "rows with unreadable dates are left out"
        );
    }

    let events_name = format!("{}_EVENTS", plan.name);
    let mut events = copy_events(&table, &mappings, fields, &events_name, |row| {
        valid.matches(row) && selected.as_ref().is_none_or(|filter| filter.matches(row))
    })?;
    normalize_nulls(&mut events, &fields.from_measure);
    round_measures(&mut events, &fields.measures(), decimal_places + 1);
    staging.write_table(&events)?;
    tracing::info!(
        feature_class = %plan.name,
        rows = events.len(),
        source_rows = table.len(),
        "copied events"
    );

    let mut summary = FeatureClassSummary {
        name: plan.name.clone(),
        overlay_order: plan.overlay_order,
        dissolve_fields: plan.dissolve_field_list(),
        event_rows: events.len(),
        dissolved_rows: 0,
        unreadable_date_rows,
    };
    if events.is_empty() {
        return Ok(StagedFeatureClass {
            summary,
            dissolved: None,
            schema: events.fields,
        });
    }

    let dissolved = dissolve_events(
        &events,
        &format!("{}_DISSOLVE", plan.name),
        fields,
        &plan.output_fields(),
    )
    .map_err(|err| conversion(format!("dissolve {}", plan.name), err))?;
    staging.write_table(&dissolved)?;
    tracing::info!(
        feature_class = %plan.name,
        fields = %summary.dissolve_fields,
        rows = dissolved.len(),
        "dissolved events"
    );
    summary.dissolved_rows = dissolved.len();
    Ok(StagedFeatureClass {
        summary,
        dissolved: Some(dissolved),
        schema: events.fields,
    })
}

/// Accumulator used when every feature class came up empty.
fn empty_accumulator(staged: &[StagedFeatureClass], fields: &ControlFields) -> Table {
    let route_field = staged
        .iter()
        .flat_map(|staged| staged.schema.iter())
        .find(|field| field.is_named(&fields.route_id))
        .cloned()
        .unwrap_or_else(|| Field::new(fields.route_id.clone(), FieldType::Text));
    Table::new(
        "OVERLAY_EMPTY",
        vec![
            route_field,
            Field::new(fields.from_measure.clone(), FieldType::Double),
            Field::new(fields.to_measure.clone(), FieldType::Double),
        ],
    )
}
