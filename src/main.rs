//! Kuadrant testsuite - end-to-end scenarios for Kuadrant gateway policies
//!
//! Provisions Gateways, HTTPRoutes, backends and Kuadrant policies on a live
//! Kubernetes/OpenShift cluster, plus a Keycloak realm where needed, then
//! sends HTTP traffic through the result and checks what comes back.
//!
//! ## Usage
//!
//! ```bash
//! # Run every scenario
//! kuadrant-testsuite run
//!
//! # Run selected scenarios, keeping what they create
//! kuadrant-testsuite run --scenario 1 --scenario signing-key-revocation --keep
//!
//! # Without Kuadrant installed only plain routing runs
//! kuadrant-testsuite run --standalone
//!
//! # List scenarios
//! kuadrant-testsuite list --detailed
//!
//! # Create a configuration file
//! kuadrant-testsuite config init
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::info;

mod backend;
mod cli;
mod config;
mod error;
mod executor;
mod fixtures;
mod gateway;
mod http;
mod k8s;
mod models;
mod oidc;
mod output;
mod policy;
mod scenarios;
mod utils;

use cli::Args;
use config::Settings;
use executor::{RunOptions, ScenarioRunner};
use k8s::KubeCluster;
use models::ScenarioCase;
use output::{OutputFormat, ResultFormatter};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    match args.command {
        cli::Command::Run(run_args) => {
            let success = run_scenarios(args.config.as_deref(), run_args).await?;
            if !success {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_scenarios(list_args);
        }
        cli::Command::Config(config_args) => {
            manage_config(args.config.as_deref(), config_args)?;
        }
    }

    Ok(())
}

async fn run_scenarios(config_path: Option<&Path>, args: cli::RunArgs) -> Result<bool> {
    let settings = Settings::resolve(config_path)?;
    let format: OutputFormat = args.format.parse().map_err(anyhow::Error::msg)?;

    let project = &settings.service_protection.project;
    let cluster = KubeCluster::connect(settings.cluster.context.as_deref(), Some(project.as_str()))
        .await
        .context("Unable to create Kubernetes client")?;
    if !cluster.connected().await {
        anyhow::bail!("Not logged into Kubernetes or project {project} does not exist");
    }

    let options = RunOptions {
        standalone: args.standalone,
        keep: args.keep,
        enforce: args.enforce,
    };
    let runner = ScenarioRunner::new(&settings, cluster, options);
    let scenarios = args.scenarios();
    info!("Run {} selected {} scenarios", runner.run_label(), scenarios.len());

    let summary = runner.run_all(&scenarios).await;

    let mut formatter = ResultFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_summary(&summary)?);

    if let Some(path) = &args.output {
        output::write_report(path, &summary)?;
        println!("Report saved to: {}", path.display());
    }

    Ok(summary.is_success())
}

fn list_scenarios(args: cli::ListArgs) {
    let all = ScenarioCase::all();
    println!("\nKuadrant Scenarios ({} total)\n", all.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_category = "";

    for case in all {
        let category = case.category();
        if category != current_category {
            println!("\n{category}:");
            println!("──────────────────────────────────────────────────────────────────────");
            current_category = category;
        }

        if args.detailed {
            let requires = if case.needs_kuadrant() { "Kuadrant" } else { "-" };
            println!("  {:2}. {:24} [{}] requires: {}", case.number(), case.name(), case.slug(), requires);
            println!("      {}", case.description());
        } else {
            println!("  {:2}. {}", case.number(), case.name());
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
}

fn manage_config(config_path: Option<&Path>, args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            Settings::example().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to point the suite at your cluster and Keycloak.");
        }

        cli::ConfigAction::Show { key } => {
            let settings = Settings::resolve(config_path)?;
            match key {
                Some(key) => match settings.lookup(&key) {
                    Some(value) => print!("{}", serde_yaml::to_string(&value)?),
                    None => anyhow::bail!("{key} is not set"),
                },
                None => print!("{}", serde_yaml::to_string(&settings)?),
            }
        }

        cli::ConfigAction::Env => {
            config::EnvConfig::load().print_summary();
            println!();
            config::print_env_help();
        }
    }

    Ok(())
}
