//! `catsync catalog`: read-only catalog inspection.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use catsync_catalog::{CatalogClient, HttpCatalog, ListFilter};

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List catalog entries.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only entries carrying this syncer's ownership marker.
    #[arg(long)]
    pub owned: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "owner")]
    owner: String,
    #[tabled(rename = "tags")]
    tags: String,
}

pub fn run(command: CatalogCommand, config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config, None)?;
    match command {
        CatalogCommand::List(args) => {
            let client = HttpCatalog::new(&config.catalog).context("invalid catalog address")?;
            let filter = if args.owned {
                ListFilter::owned_by(config.owner.clone())
            } else {
                ListFilter::all()
            };
            let entries = super::block_on(client.list(&filter))?
                .with_context(|| format!("failed to list catalog at {}", config.catalog.address))?;

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries)
                        .context("failed to serialize catalog JSON")?
                );
                return Ok(());
            }
            if entries.is_empty() {
                println!("No catalog entries.");
                return Ok(());
            }
            let rows: Vec<EntryRow> = entries
                .into_iter()
                .map(|entry| EntryRow {
                    owner: entry.owner().unwrap_or("-").to_string(),
                    id: entry.id,
                    name: entry.name,
                    address: format!("{}:{}", entry.address, entry.port),
                    tags: entry.tags.join(","),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}
