//! `lantern init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use lantern_core::settings::init_at;

/// Write the default settings file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing settings file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = init_at(&home, self.force).context("failed to write default settings")?;
        println!("✓ Wrote default settings to {}", path.display());
        println!("  Edit the `profiles` section to point at your inventories.");
        Ok(())
    }
}
