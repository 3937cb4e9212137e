//! Command entry points wired from `main`.
use crate::cli::{InitArgs, InventoryArgs, OverlayArgs, ValidateArgs};
use crate::config::{default_config, resolve_config, write_config};
use crate::inventory::portal::HttpPortal;
use crate::inventory::{run_inventory, InventoryRequest};
use crate::overlay::index::IndexTable;
use crate::overlay::validate::validate_index;
use crate::overlay::{run_overlay, OverlayRequest};
use crate::staging::RunStamp;
use crate::table::Workspace;
use crate::util::{display_path, resolve_view_date};
use anyhow::{anyhow, Context, Result};
use std::time::Duration;

pub fn run_init(args: InitArgs) -> Result<()> {
    if args.config.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    write_config(&args.config, &default_config())?;
    println!("Wrote overlay config to {}", args.config.display());
    Ok(())
}

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = resolve_config(args.fields.config.as_deref(), &args.fields.overrides())?;
    let index = IndexTable::load(&args.index)
        .with_context(|| format!("read index table {}", args.index.display()))?;
    let workspace = Workspace::open(&args.workspace)?;
    let report = validate_index(&index, &workspace, &config.control_fields())?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize validation report")?;
        println!("{text}");
    } else {
        println!(
            "Checked {} index rows across {} feature classes.",
            report.rows_checked, report.feature_classes_checked
        );
        for problem in &report.problems {
            println!("  - {problem}");
        }
    }
    if !report.is_valid() {
        return Err(anyhow!(
            "index validation failed with {} error(s)",
            report.error_count()
        ));
    }
    if !args.json {
        println!("Index table is valid.");
    }
    Ok(())
}

pub fn run_overlay_command(args: OverlayArgs) -> Result<()> {
    let config = resolve_config(args.fields.config.as_deref(), &args.overrides())?;
    let at = resolve_view_date(args.date.as_deref())?;
    let request = OverlayRequest {
        index_path: args.index.clone(),
        workspace: args.workspace.clone(),
        routes_path: args.routes.clone(),
        out_dir: args.out_dir.clone(),
        config,
        at,
        stamp: RunStamp::now(),
    };
    let report = run_overlay(&request).context("route-event overlay failed")?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize overlay report")?;
        println!("{text}");
        return Ok(());
    }
    println!(
        "Staging workspace: {}",
        display_path(&report.staging_workspace, Some(&args.out_dir))
    );
    for summary in &report.feature_classes {
        println!(
            "  {} (order {}): {} events, {} dissolved",
            summary.name, summary.overlay_order, summary.event_rows, summary.dissolved_rows
        );
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    println!("Output table: {}", report.output_table);
    println!(
        "Output feature class: {} ({} rows, {} slivers removed)",
        report.output_feature_class, report.output_rows, report.slivers_removed
    );
    Ok(())
}

pub fn run_inventory_command(args: InventoryArgs) -> Result<()> {
    let portal = HttpPortal::new(
        &args.portal,
        args.token.clone(),
        Duration::from_secs(args.timeout_secs),
    );
    let request = InventoryRequest {
        item_types: args.item_types.clone(),
        owner: args.owner.clone(),
        max_items: args.max_items,
        out_dir: args.out_dir.clone(),
        stamp: RunStamp::now(),
    };
    let report = run_inventory(&portal, &request)?;

    println!(
        "Described {} of {} items.",
        report.described, report.items_found
    );
    for path in &report.tsv_files {
        println!("Wrote {}", display_path(path, Some(&args.out_dir)));
    }
    println!("Wrote {}", display_path(&report.catalog, Some(&args.out_dir)));
    if !report.failures.is_empty() {
        println!("{} item(s) failed:", report.failures.len());
        for failure in &report.failures {
            println!("  - {}", failure.error);
        }
    }
    Ok(())
}
