//! catsync: keep an external service catalog in step with cluster services.
//!
//! # Usage
//!
//! ```text
//! catsync run [--config <file>] [--manifests <dir>]
//! catsync render [--config <file>] [--manifests <dir>] [--json]
//! catsync plan [--config <file>] [--manifests <dir>] [--offline] [--json]
//! catsync catalog list [--config <file>] [--owned] [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{catalog::CatalogCommand, plan::PlanArgs, render::RenderArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "catsync",
    version,
    about = "Sync cluster services into an external service catalog",
    long_about = None,
)]
struct Cli {
    /// YAML config file; built-in defaults when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync engine in the foreground until ctrl-c.
    Run(RunArgs),

    /// Show the catalog registrations the current manifests map to.
    Render(RenderArgs),

    /// Show what the next reconciliation pass would change.
    Plan(PlanArgs),

    /// Inspect the external catalog.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    catsync_daemon::init_tracing();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => args.run(config),
        Commands::Render(args) => args.run(config),
        Commands::Plan(args) => args.run(config),
        Commands::Catalog { command } => commands::catalog::run(command, config),
    }
}
