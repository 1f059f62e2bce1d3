//! `catsync plan`: dry-run reconciliation against the live catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use catsync_catalog::{CatalogClient, HttpCatalog, MemoryCatalog};
use catsync_core::SyncConfig;
use catsync_sync::{ReconcilePlan, Syncer};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Override `source.manifest_dir`.
    #[arg(long)]
    pub manifests: Option<PathBuf>,

    /// Diff against an empty in-memory catalog instead of the agent.
    #[arg(long)]
    pub offline: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let config = super::load_config(config, self.manifests)?;
        let client: Arc<dyn CatalogClient> = if self.offline {
            Arc::new(MemoryCatalog::new())
        } else {
            Arc::new(HttpCatalog::new(&config.catalog).context("invalid catalog address")?)
        };
        let plan = super::block_on(compute(&config, client))??;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }
        print_plan(&plan);
        Ok(())
    }
}

async fn compute(config: &SyncConfig, client: Arc<dyn CatalogClient>) -> Result<ReconcilePlan> {
    let store = super::desired_state(config).await?;
    let syncer = Syncer::new(client, store, config.owner.clone(), config.syncer.clone());
    syncer
        .plan()
        .await
        .with_context(|| format!("failed to read catalog at {}", config.catalog.address))
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "catalog id")]
    id: String,
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_plan(plan: &ReconcilePlan) {
    println!(
        "{} to register | {} to deregister | {} conflicts | {} unchanged",
        plan.register.len(),
        plan.deregister.len(),
        plan.conflicts.len(),
        plan.unchanged,
    );
    if plan.is_converged() && plan.conflicts.is_empty() {
        println!("{}", "Catalog is in sync.".green());
        return;
    }

    let mut rows = Vec::new();
    for item in &plan.register {
        let reg = &item.registration;
        let action = if item.existing { "update" } else { "register" };
        rows.push(PlanRow {
            action: action.green().to_string(),
            id: reg.id.clone(),
            service: item.key.to_string(),
            detail: format!("{} {}:{}", reg.name, reg.address, reg.port),
        });
    }
    for item in &plan.deregister {
        rows.push(PlanRow {
            action: "deregister".red().to_string(),
            id: item.id.clone(),
            service: item
                .key
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            detail: "no matching service".to_string(),
        });
    }
    for conflict in &plan.conflicts {
        rows.push(PlanRow {
            action: "conflict".yellow().to_string(),
            id: conflict.id.clone(),
            service: conflict.key.to_string(),
            detail: format!(
                "held by owner '{}'",
                conflict.owner.as_deref().unwrap_or("<none>")
            ),
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
