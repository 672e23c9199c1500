//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::ScenarioCase;

/// End-to-end scenarios for Kuadrant gateway policies
#[derive(Parser, Debug)]
#[command(name = "kuadrant-testsuite")]
#[command(version)]
#[command(about = "Provision Kuadrant topologies and verify policy behavior end to end")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run scenarios against the current cluster
    Run(RunArgs),

    /// List available scenarios
    List(ListArgs),

    /// Inspect or create configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario number or name, repeatable; every scenario when omitted
    #[arg(short, long, value_parser = parse_scenario)]
    pub scenario: Vec<ScenarioCase>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save the run report to a file (JSON, or CSV by extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not use Kuadrant; scenarios that need it are skipped
    #[arg(long)]
    pub standalone: bool,

    /// Keep created objects after the run
    #[arg(long)]
    pub keep: bool,

    /// Fail scenarios whose optional configuration is missing instead of skipping them
    #[arg(long)]
    pub enforce: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl RunArgs {
    /// Selected scenarios in number order, every scenario when none given
    pub fn scenarios(&self) -> Vec<ScenarioCase> {
        if self.scenario.is_empty() {
            return ScenarioCase::all();
        }
        let mut selected = self.scenario.clone();
        selected.sort_by_key(|case| case.number());
        selected.dedup();
        selected
    }
}

fn parse_scenario(value: &str) -> Result<ScenarioCase, String> {
    ScenarioCase::parse(value).ok_or_else(|| {
        format!("unknown scenario '{value}', see `kuadrant-testsuite list`")
    })
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show scenario descriptions
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Print a single value by dotted path, e.g. `authorino.deploy`
        #[arg(long)]
        key: Option<String>,
    },

    /// Write an example configuration file
    Init {
        /// Destination
        #[arg(default_value = "kuadrant-testsuite.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show environment overrides
    Env,
}
