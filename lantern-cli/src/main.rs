//! Lantern: preview Ansible templates against real inventories.
//!
//! # Usage
//!
//! ```text
//! lantern init [--force]
//! lantern profiles
//! lantern render --template '{{ inventory_hostname }}' [--profile P] [--host H] [--role R]
//!                [--gather-facts] [--vars S | --vars-file F] [--json] [--debug]
//! lantern hosts [--profile P]
//! lantern vars --host H [--role R] [--profile P]
//! lantern roles [--profile P]
//! lantern daemon start [--workspace DIR] | stop | status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    init::InitArgs,
    probe::{HostsArgs, RolesArgs, VarsArgs},
    profiles::ProfilesArgs,
    render::RenderArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "lantern",
    version,
    about = "Render Ansible templates against an inventory without running a play",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default settings file.
    Init(InitArgs),

    /// List configured execution profiles.
    Profiles(ProfilesArgs),

    /// Render a template once and print the result.
    Render(RenderArgs),

    /// List inventory hosts of a profile.
    Hosts(HostsArgs),

    /// List variable names visible to a host.
    Vars(VarsArgs),

    /// List roles available to a profile.
    Roles(RolesArgs),

    /// Manage the background daemon serving UI sessions.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Profiles(args) => args.run(),
        Commands::Render(args) => args.run(),
        Commands::Hosts(args) => args.run(),
        Commands::Vars(args) => args.run(),
        Commands::Roles(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
