//! `lantern profiles`: configured execution profiles.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use lantern_core::settings::settings_path_at;

#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "profile")]
    key: String,
    #[tabled(rename = "playbook")]
    playbook: String,
    #[tabled(rename = "galaxy")]
    galaxy: String,
    #[tabled(rename = "doc")]
    doc: String,
    #[tabled(rename = "args")]
    args: String,
    #[tabled(rename = "env")]
    env: usize,
}

impl ProfilesArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home)?.settings;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&settings.profiles)?);
            return Ok(());
        }

        println!(
            "{} {}",
            "settings:".bold(),
            settings_path_at(&home).display()
        );
        let rows: Vec<ProfileRow> = settings
            .profiles
            .iter()
            .map(|(key, profile)| ProfileRow {
                key: key.to_string(),
                playbook: profile.cmd_playbook.clone(),
                galaxy: profile.cmd_galaxy.clone(),
                doc: profile.cmd_doc.clone(),
                args: profile.args.join(" "),
                env: profile.env.len(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!(
            "role detection: {} | timeout: {} | tab size: {}",
            settings.role_detection_mode,
            match settings.timeout_ms {
                0 => "none".to_string(),
                ms => format!("{ms} ms"),
            },
            settings.tab_size,
        );
        Ok(())
    }
}
