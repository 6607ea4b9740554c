//! `lantern hosts | vars | roles`: one-shot enumeration probes.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use lantern_core::ProfileKey;

#[derive(Args, Debug)]
pub struct HostsArgs {
    #[arg(long, short = 'p', default_value = "default")]
    pub profile: String,
}

#[derive(Args, Debug)]
pub struct VarsArgs {
    #[arg(long, short = 'p', default_value = "default")]
    pub profile: String,

    #[arg(long)]
    pub host: String,

    /// Role whose defaults are included.
    #[arg(long, default_value = "")]
    pub role: String,
}

#[derive(Args, Debug)]
pub struct RolesArgs {
    #[arg(long, short = 'p', default_value = "default")]
    pub profile: String,
}

impl HostsArgs {
    pub fn run(self) -> Result<()> {
        let engine = super::engine()?;
        let profile = ProfileKey::from(self.profile);
        let listing = super::runtime()?.block_on(engine.list_hosts(&profile));
        report(listing.successful, "host listing", &listing.hosts);
        Ok(())
    }
}

impl VarsArgs {
    pub fn run(self) -> Result<()> {
        let engine = super::engine()?;
        let profile = ProfileKey::from(self.profile);
        let listing =
            super::runtime()?.block_on(engine.list_host_vars(&profile, &self.host, &self.role));
        report(listing.successful, "variable listing", &listing.vars);
        Ok(())
    }
}

impl RolesArgs {
    pub fn run(self) -> Result<()> {
        let engine = super::engine()?;
        let profile = ProfileKey::from(self.profile);
        let listing = super::runtime()?.block_on(engine.list_roles(&profile));
        let roles: Vec<String> = listing
            .roles
            .into_iter()
            .filter(|role| !role.is_empty())
            .collect();
        report(listing.successful, "role listing", &roles);
        Ok(())
    }
}

fn report(successful: bool, what: &str, names: &[String]) {
    if !successful {
        eprintln!(
            "{} {what} failed; run `lantern render --debug` with the same profile to see why",
            "warning:".yellow().bold()
        );
    }
    for name in names {
        println!("{name}");
    }
}
