//! Index table loading and per-feature-class planning.
//!
//! The index table drives the whole overlay: each row maps one input field of
//! a feature class to an output field name and carries an overlay order.
use serde::Deserialize;
use std::path::Path;

/// One row of the index table CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexRow {
    #[serde(rename = "IN_FC")]
    pub in_fc: String,
    #[serde(rename = "IN_FLD")]
    pub in_fld: String,
    #[serde(rename = "OUT_FLD_NAME")]
    pub out_fld_name: String,
    #[serde(rename = "FC_OV_ORDER")]
    pub fc_ov_order: f64,
}

impl IndexRow {
    #[cfg(test)]
    pub fn new(in_fc: &str, in_fld: &str, out_fld_name: &str, fc_ov_order: f64) -> Self {
        Self {
            in_fc: in_fc.to_string(),
            in_fld: in_fld.to_string(),
            out_fld_name: out_fld_name.to_string(),
            fc_ov_order,
        }
    }
}

/// Everything the overlay needs to know about one source feature class.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClassPlan {
    pub name: String,
    /// `(input field, output field)` pairs in first-seen row order.
    pub mappings: Vec<(String, String)>,
    /// Mean `FC_OV_ORDER` across this feature class's rows.
    pub overlay_order: f64,
}

impl FeatureClassPlan {
    pub fn output_fields(&self) -> Vec<String> {
        self.mappings.iter().map(|(_, out)| out.clone()).collect()
    }

    /// Semicolon-joined dissolve field list.
    pub fn dissolve_field_list(&self) -> String {
        self.output_fields().join(";")
    }
}

/// The loaded index table, rows in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexTable {
    pub rows: Vec<IndexRow>,
}

impl IndexTable {
    #[cfg(test)]
    pub fn new(rows: Vec<IndexRow>) -> Self {
        Self { rows }
    }

    /// Load the index table from a CSV file with a header row.
    pub fn load(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: IndexRow = record?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Group rows by feature class, preserving first-seen order.
    ///
    /// Feature class names match case-insensitively; the first spelling wins.
    /// Repeated `(input, output)` pairs collapse to one mapping.
    pub fn feature_classes(&self) -> Vec<FeatureClassPlan> {
        let mut plans: Vec<FeatureClassPlan> = Vec::new();
        let mut order_sums: Vec<(f64, usize)> = Vec::new();
        for row in &self.rows {
            let position = plans
                .iter()
                .position(|plan| plan.name.eq_ignore_ascii_case(&row.in_fc));
            let index = match position {
                Some(index) => index,
                None => {
                    plans.push(FeatureClassPlan {
                        name: row.in_fc.clone(),
                        mappings: Vec::new(),
                        overlay_order: 0.0,
                    });
                    order_sums.push((0.0, 0));
                    plans.len() - 1
                }
            };
            let mapping = (row.in_fld.clone(), row.out_fld_name.clone());
            if !plans[index].mappings.contains(&mapping) {
                plans[index].mappings.push(mapping);
            }
            order_sums[index].0 += row.fc_ov_order;
            order_sums[index].1 += 1;
        }
        for (plan, (sum, count)) in plans.iter_mut().zip(order_sums) {
            plan.overlay_order = sum / count as f64;
        }
        plans
    }
}
