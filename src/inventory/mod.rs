//! Web inventory of portal content items.
//!
//! Enumerates items of the requested types, describes each one, and writes a
//! tab-delimited report per type plus a JSON catalog. A failing item is
//! recorded and the batch continues.
use crate::staging::RunStamp;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

pub mod describe;
pub mod portal;
pub mod report;

use describe::{describe_item, ItemReport};
use portal::{PortalApi, PortalError, PortalItem, SEARCH_PAGE_SIZE};
use report::{build_catalog, catalog_file_name, tsv_file_name, write_catalog, write_tsv, ItemFailure};

/// Item types cataloged when none are requested.
pub const DEFAULT_ITEM_TYPES: [&str; 6] = [
    "Web Map",
    "Web Mapping Application",
    "Dashboard",
    "StoryMap",
    "Feature Service",
    "Map Service",
];

#[derive(Debug, Clone)]
pub struct InventoryRequest {
    pub item_types: Vec<String>,
    pub owner: Option<String>,
    /// Per-type cap on enumerated items.
    pub max_items: Option<usize>,
    pub out_dir: PathBuf,
    pub stamp: RunStamp,
}

impl InventoryRequest {
    /// Requested types, de-duplicated ignoring case; defaults when empty.
    pub fn resolved_types(&self) -> Vec<String> {
        let requested: Vec<String> = if self.item_types.is_empty() {
            DEFAULT_ITEM_TYPES.iter().map(|t| t.to_string()).collect()
        } else {
            self.item_types.clone()
        };
        let mut seen = HashSet::new();
        requested
            .into_iter()
            .map(|item_type| item_type.trim().to_string())
            .filter(|item_type| !item_type.is_empty())
            .filter(|item_type| seen.insert(item_type.to_ascii_lowercase()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub items_found: usize,
    pub described: usize,
    pub failures: Vec<ItemFailure>,
    pub tsv_files: Vec<PathBuf>,
    pub catalog: PathBuf,
    pub elapsed_ms: u128,
}

fn search_query(item_type: &str, owner: Option<&str>) -> String {
    let escaped = item_type.replace('"', "");
    match owner {
        Some(owner) => format!("type:\"{escaped}\" AND owner:{owner}"),
        None => format!("type:\"{escaped}\""),
    }
}

/// Page through the search endpoint once per item type.
///
/// Search matches types loosely, so results are kept only when their type
/// equals the requested one. Items are de-duplicated by id.
pub fn enumerate_items<A: PortalApi + ?Sized>(
    api: &A,
    item_types: &[String],
    owner: Option<&str>,
    max_items: Option<usize>,
) -> Result<Vec<PortalItem>, PortalError> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for item_type in item_types {
        let query = search_query(item_type, owner);
        let mut start = 1i64;
        let mut kept = 0usize;
        'pages: loop {
            if max_items.is_some_and(|max| kept >= max) {
                break;
            }
            let page = api.search(&query, start, SEARCH_PAGE_SIZE)?;
            tracing::debug!(
                item_type = %item_type,
                start,
                total = page.total,
                results = page.results.len(),
                "search page"
            );
            for item in page.results {
                if max_items.is_some_and(|max| kept >= max) {
                    break 'pages;
                }
                if !item.item_type.eq_ignore_ascii_case(item_type) || !seen.insert(item.id.clone()) {
                    continue;
                }
                kept += 1;
                items.push(item);
            }
            if page.next_start <= start {
                break;
            }
            start = page.next_start;
        }
        tracing::info!(item_type = %item_type, items = kept, "enumerated items");
    }
    Ok(items)
}

/// Run the inventory against `api`, writing reports under `out_dir`.
pub fn run_inventory<A: PortalApi + ?Sized>(
    api: &A,
    request: &InventoryRequest,
) -> Result<InventoryReport> {
    let started = Instant::now();
    let item_types = request.resolved_types();
    fs::create_dir_all(&request.out_dir)
        .with_context(|| format!("create {}", request.out_dir.display()))?;
    let items = enumerate_items(api, &item_types, request.owner.as_deref(), request.max_items)
        .with_context(|| format!("enumerate items on {}", api.portal_url()))?;

    let extracted_at = request.stamp.to_iso();
    let mut described: Vec<ItemReport> = Vec::with_capacity(items.len());
    let mut failures = Vec::new();
    for item in &items {
        match describe_item(api, item, &extracted_at) {
            Ok(report) => described.push(report),
            Err(err) => {
                tracing::warn!(item = %err.item_id(), error = %err, "item failed");
                failures.push(ItemFailure::from(&err));
            }
        }
    }

    let mut tsv_files = Vec::with_capacity(item_types.len());
    for item_type in &item_types {
        let of_type: Vec<&ItemReport> = described
            .iter()
            .filter(|report| report.item_type.eq_ignore_ascii_case(item_type))
            .collect();
        let path = request.out_dir.join(tsv_file_name(item_type, &request.stamp));
        write_tsv(&path, &of_type)?;
        tracing::info!(item_type = %item_type, rows = of_type.len(), path = %path.display(), "wrote report");
        tsv_files.push(path);
    }

    let catalog = build_catalog(
        api.portal_url(),
        &extracted_at,
        &item_types,
        &described,
        failures.clone(),
    );
    let catalog_path = write_catalog(
        &request.out_dir.join(catalog_file_name(&request.stamp)),
        &catalog,
    )?;

    let report = InventoryReport {
        items_found: items.len(),
        described: described.len(),
        failures,
        tsv_files,
        catalog: catalog_path,
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        items = report.items_found,
        errors = report.failures.len(),
        elapsed_ms = report.elapsed_ms,
        "inventory complete"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
