//! `lantern render`: one render through the engine, without the daemon.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use lantern_core::{ProfileKey, RenderRequest, RenderResult, LOCALHOST};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Execution profile.
    #[arg(long, short = 'p', default_value = "default")]
    pub profile: String,

    /// Inventory host to render for.
    #[arg(long, default_value = LOCALHOST)]
    pub host: String,

    /// Role whose defaults and vars are attached (its tasks never run).
    #[arg(long, default_value = "")]
    pub role: String,

    /// Gather facts before rendering.
    #[arg(long)]
    pub gather_facts: bool,

    /// Extra variables as a JSON or YAML mapping.
    #[arg(long, conflicts_with = "vars_file")]
    pub vars: Option<String>,

    /// File holding extra variables as a JSON or YAML mapping.
    #[arg(long, value_name = "FILE")]
    pub vars_file: Option<PathBuf>,

    /// Template text.
    #[arg(long, short = 't', required_unless_present = "template_file", conflicts_with = "template_file")]
    pub template: Option<String>,

    /// File holding the template.
    #[arg(long, value_name = "FILE")]
    pub template_file: Option<PathBuf>,

    /// Emit the full result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also print the raw engine output.
    #[arg(long)]
    pub debug: bool,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let request = self.request()?;
        let engine = super::engine()?;
        let result = super::runtime()?.block_on(engine.render(&request));

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to serialize render result")?
            );
        } else {
            print_result(&result, self.debug);
        }

        if !result.successful {
            bail!("render failed ({})", result.kind);
        }
        Ok(())
    }

    fn request(&self) -> Result<RenderRequest> {
        let template = match (&self.template, &self.template_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => read(path, "template")?,
            (None, None) => bail!("either --template or --template-file is required"),
        };
        let variables = match (&self.vars, &self.vars_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => read(path, "variables")?,
            (None, None) => String::new(),
        };
        Ok(RenderRequest {
            profile: ProfileKey::from(self.profile.as_str()),
            host: self.host.clone(),
            role: self.role.clone(),
            gather_facts: self.gather_facts,
            variables,
            template,
        })
    }
}

fn read(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {what} file {}", path.display()))
}

fn print_result(result: &RenderResult, debug: bool) {
    if result.successful {
        println!("{}", result.result);
    } else {
        eprintln!("{} {}", "✗".red().bold(), result.result);
    }
    if debug && !result.debug.is_empty() {
        eprintln!("{}", "--- engine output ---".bright_black());
        eprintln!("{}", result.debug);
    }
}
