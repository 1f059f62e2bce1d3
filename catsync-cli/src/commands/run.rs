//! `catsync run`: foreground engine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override `source.manifest_dir`.
    #[arg(long)]
    pub manifests: Option<PathBuf>,
}

impl RunArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let config = super::load_config(config, self.manifests)?;
        catsync_daemon::start_blocking(config).context("catsync engine exited with error")
    }
}
