use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod inventory;
mod overlay;
mod staging;
mod table;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Validate(args) => workflow::run_validate(args),
        Command::Overlay(args) => workflow::run_overlay_command(args),
        Command::Inventory(args) => workflow::run_inventory_command(args),
    }
}
