//! `catsync render`: desired registrations, computed locally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use catsync_core::{CatalogRegistration, ServiceKey, SyncConfig};
use catsync_daemon::ManifestSource;
use catsync_sync::{build_registration, ServiceSource, SourceError};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Override `source.manifest_dir`.
    #[arg(long)]
    pub manifests: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl RenderArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let config = super::load_config(config, self.manifests)?;
        let rendered = super::block_on(render(&config))??;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rendered).context("failed to serialize render JSON")?
            );
            return Ok(());
        }
        print_table(&config, rendered);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Rendered {
    key: ServiceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration: Option<CatalogRegistration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<String>,
}

#[derive(Tabled)]
struct RenderRow {
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "catalog id")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "tags")]
    tags: String,
}

async fn render(config: &SyncConfig) -> Result<Vec<Rendered>> {
    let source = ManifestSource::new(&config.source.manifest_dir);
    let keys = source.list_keys().await.with_context(|| {
        format!(
            "failed to list manifests under {}",
            config.source.manifest_dir.display()
        )
    })?;

    let mut rendered = Vec::with_capacity(keys.len());
    for key in keys {
        let outcome = match source.get(&key).await {
            Ok(Some(service)) => build_registration(&service, &config.owner, &config.mapper)
                .map_err(|skip| skip.to_string()),
            Ok(None) => Err("removed while rendering".to_string()),
            Err(SourceError::Malformed { reason, .. }) => Err(format!("malformed: {reason}")),
            Err(err) => return Err(err).with_context(|| format!("failed to read {key}")),
        };
        let (registration, skipped) = match outcome {
            Ok(registration) => (Some(registration), None),
            Err(reason) => (None, Some(reason)),
        };
        rendered.push(Rendered {
            key,
            registration,
            skipped,
        });
    }
    Ok(rendered)
}

fn print_table(config: &SyncConfig, rendered: Vec<Rendered>) {
    if rendered.is_empty() {
        println!(
            "No service manifests under {}.",
            config.source.manifest_dir.display()
        );
        return;
    }

    let synced = rendered.iter().filter(|r| r.registration.is_some()).count();
    println!(
        "{} services | {} synced | owner {}",
        rendered.len(),
        synced,
        config.owner.bold()
    );

    let rows: Vec<RenderRow> = rendered
        .into_iter()
        .map(|r| match r.registration {
            Some(reg) => RenderRow {
                service: r.key.to_string(),
                id: reg.id,
                name: reg.name,
                address: format!("{}:{}", reg.address, reg.port),
                tags: reg.tags.join(","),
            },
            None => RenderRow {
                service: r.key.to_string(),
                id: "-".bright_black().to_string(),
                name: "-".bright_black().to_string(),
                address: "-".bright_black().to_string(),
                tags: format!("skipped: {}", r.skipped.unwrap_or_default())
                    .yellow()
                    .to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
