//! CLI argument parsing for the linear referencing toolbox.
//!
//! The CLI is thin: each command maps onto one workflow entry point and every
//! overlay setting can come from the config file or a flag.
use crate::config::ConfigOverrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "lrs",
    version,
    about = "Route-event overlay and web inventory tools",
    after_help = "Commands:\n  init --config <path>                    Write a default overlay config\n  validate --index <csv> --workspace <dir>  Check an index table against a workspace\n  overlay --index <csv> --workspace <dir> --routes <json> --out-dir <dir>\n                                          Run the full route-event overlay\n  inventory --portal <url> --out-dir <dir>  Catalog portal items to TSV and JSON\n\nExamples:\n  lrs init --config overlay.json\n  lrs validate --index index.csv --workspace data --config overlay.json\n  lrs overlay --index index.csv --workspace data --routes routes.json --out-dir out --date 2024-01-01\n  lrs inventory --portal https://gis.example.org/portal --out-dir inventory --type \"Web Map\"",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log debug detail to stderr (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Validate(ValidateArgs),
    Overlay(OverlayArgs),
    Inventory(InventoryArgs),
}

/// Init command inputs.
#[derive(Parser, Debug)]
#[command(about = "Write a default overlay config")]
pub struct InitArgs {
    /// Path of the config file to create
    #[arg(long, value_name = "PATH", default_value = "overlay.json")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

/// Control-field and run-setting overrides shared by validate and overlay.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    /// Overlay config JSON (defaults apply when omitted)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Route identifier field name
    #[arg(long, value_name = "FIELD")]
    pub route_id_field: Option<String>,

    /// From-measure field name
    #[arg(long, value_name = "FIELD")]
    pub from_measure_field: Option<String>,

    /// To-measure field name
    #[arg(long, value_name = "FIELD")]
    pub to_measure_field: Option<String>,

    /// From-date field name
    #[arg(long, value_name = "FIELD")]
    pub from_date_field: Option<String>,

    /// To-date field name
    #[arg(long, value_name = "FIELD")]
    pub to_date_field: Option<String>,
}

impl FieldArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            route_id_field: self.route_id_field.clone(),
            from_measure_field: self.from_measure_field.clone(),
            to_measure_field: self.to_measure_field.clone(),
            from_date_field: self.from_date_field.clone(),
            to_date_field: self.to_date_field.clone(),
            ..ConfigOverrides::default()
        }
    }
}

/// Validate command inputs.
#[derive(Parser, Debug)]
#[command(about = "Check an index table against a workspace")]
pub struct ValidateArgs {
    /// Index table CSV (IN_FC, IN_FLD, OUT_FLD_NAME, FC_OV_ORDER)
    #[arg(long, value_name = "PATH")]
    pub index: PathBuf,

    /// Source workspace directory of JSON tables
    #[arg(long, value_name = "DIR")]
    pub workspace: PathBuf,

    /// Emit the validation report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub fields: FieldArgs,
}

/// Overlay command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the route-event overlay")]
pub struct OverlayArgs {
    /// Index table CSV (IN_FC, IN_FLD, OUT_FLD_NAME, FC_OV_ORDER)
    #[arg(long, value_name = "PATH")]
    pub index: PathBuf,

    /// Source workspace directory of JSON tables
    #[arg(long, value_name = "DIR")]
    pub workspace: PathBuf,

    /// Routes layer table file used to locate output events
    #[arg(long, value_name = "PATH")]
    pub routes: PathBuf,

    /// Directory receiving the staging workspace and the outputs
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Additional row filter applied to every source (SQL where clause)
    #[arg(long = "where", value_name = "SQL")]
    pub sql_filter: Option<String>,

    /// Temporal view date (YYYY-MM-DD); defaults to now
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,

    /// Decimal places for output measures
    #[arg(long, value_name = "N")]
    pub decimals: Option<u32>,

    /// Emit the run report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub fields: FieldArgs,
}

impl OverlayArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            decimal_places: self.decimals,
            sql_filter: self.sql_filter.clone(),
            ..self.fields.overrides()
        }
    }
}

/// Inventory command inputs.
#[derive(Parser, Debug)]
#[command(about = "Catalog portal content items to TSV and JSON")]
pub struct InventoryArgs {
    /// Portal base URL (e.g. https://gis.example.org/portal)
    #[arg(long, value_name = "URL")]
    pub portal: String,

    /// Directory receiving the TSV files and the JSON catalog
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Portal token; anonymous access when omitted
    #[arg(long, env = "LRS_PORTAL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Item type to catalog (repeatable; defaults to the standard web types)
    #[arg(long = "type", value_name = "TYPE")]
    pub item_types: Vec<String>,

    /// Restrict the search to items owned by this user
    #[arg(long, value_name = "USER")]
    pub owner: Option<String>,

    /// Stop after this many items per type
    #[arg(long, value_name = "N")]
    pub max_items: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn overlay_flags_become_overrides() {
        let args = RootArgs::try_parse_from([
            "lrs",
            "overlay",
            "--index",
            "index.csv",
            "--workspace",
            "data",
            "--routes",
            "routes.json",
            "--out-dir",
            "out",
            "--where",
            "LANES > 2",
            "--decimals",
            "2",
            "--route-id-field",
            "ROUTE",
        ])
        .expect("parse");
        let Command::Overlay(overlay) = args.command else {
            panic!("expected overlay command");
        };
        let overrides = overlay.overrides();
        assert_eq!(overrides.sql_filter.as_deref(), Some("LANES > 2"));
        assert_eq!(overrides.decimal_places, Some(2));
        assert_eq!(overrides.route_id_field.as_deref(), Some("ROUTE"));
        assert_eq!(overrides.to_date_field, None);
    }
}
