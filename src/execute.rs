use std::process::ExitCode;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use recon_tools::config::{ConfigFile, DefaultConfig};
use recon_tools::definition::Catalog;
use recon_tools::global::utils::get_global_config_file;
use recon_tools::graph::Target;
use recon_tools::installer::{Installer, OutcomeKind, Report, RunOptions};
use recon_tools::probe::ProbeStatus;
use crate::cli::{ToolsCommand, CLI};

#[derive(Debug, Clone, Copy)]
enum Operation {
    Install,
    Uninstall,
    Reinstall,
}

pub async fn execute(cli: CLI) -> Result<ExitCode> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_global_config_file()?,
    };
    let config = ConfigFile::load_or_default(&config_path)?;
    let defaults = config.default_config()?;
    let definitions_dir = match &cli.definitions {
        Some(dir) => dir.clone(),
        None => config.definitions_dir()?,
    };
    let catalog = Catalog::load_dir(&definitions_dir, &defaults)
        .with_context(|| format!("Could not load tool definitions from {}", definitions_dir.display()))?;
    info!("Loaded {} tool definitions ({} unavailable)", catalog.len(), catalog.failures().len());
    let installer = Installer::new(catalog);

    match cli.command {
        ToolsCommand::Install { name, jobs, timeout, json } => {
            let options = run_options(&config, jobs, timeout);
            execute_run(&installer, &defaults, Operation::Install, &name, options, json).await
        }
        ToolsCommand::Uninstall { name, timeout, json } => {
            let options = run_options(&config, None, timeout);
            execute_run(&installer, &defaults, Operation::Uninstall, &name, options, json).await
        }
        ToolsCommand::Reinstall { name, jobs, timeout, json } => {
            let options = run_options(&config, jobs, timeout);
            execute_run(&installer, &defaults, Operation::Reinstall, &name, options, json).await
        }
        ToolsCommand::List { json } => {
            execute_list(&installer, json)
        }
        ToolsCommand::Which { name } => {
            execute_which(&installer, &name)
        }
    }
}

/// Config file values with the command line flags laid over them.
fn run_options(config: &ConfigFile, jobs: Option<usize>, timeout: Option<u64>) -> RunOptions {
    let command_timeout = match timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.runner.command_timeout(),
    };
    RunOptions {
        concurrency: jobs.unwrap_or(config.runner.concurrency).max(1),
        command_timeout,
    }
}

/// A token that fires on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling, waiting for running commands to stop...".yellow());
            trigger.cancel();
        }
    });
    token
}

async fn execute_run(
    installer: &Installer,
    defaults: &DefaultConfig,
    operation: Operation,
    name: &str,
    options: RunOptions,
    json: bool,
) -> Result<ExitCode> {
    if !matches!(operation, Operation::Uninstall) {
        for dir in defaults.ensure_directories()? {
            info!("Using directory {}", dir.display());
        }
    }
    let target = Target::parse(name);
    let cancel = cancel_on_ctrl_c();
    let report = match operation {
        Operation::Install => installer.install(&target, options, &cancel).await?,
        Operation::Uninstall => installer.uninstall(&target, options, &cancel).await?,
        Operation::Reinstall => installer.reinstall(&target, options, &cancel).await?,
    };

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }
    Ok(ExitCode::from(report.exit_code()))
}

fn print_report(report: &Report) {
    if report.outcomes.is_empty() {
        println!("No tools");
        return;
    }
    for outcome in &report.outcomes {
        let label = match &outcome.kind {
            OutcomeKind::Installed => "installed".green(),
            OutcomeKind::Uninstalled => "uninstalled".green(),
            OutcomeKind::Skipped(_) => "skipped".yellow(),
            OutcomeKind::Failed(_) => "failed".red(),
        };
        match outcome.detail() {
            Some(detail) => println!("[{}] {} ({})", label, outcome.name, detail),
            None => println!("[{}] {}", label, outcome.name),
        }
    }
    let failed = report.failed().count();
    if failed > 0 {
        println!("{}", format!("{} of {} tools failed", failed, report.outcomes.len()).red());
    }
}

pub fn execute_list(installer: &Installer, json: bool) -> Result<ExitCode> {
    let catalog = installer.catalog();
    let status = installer.status();
    if json {
        let entries: Vec<serde_json::Value> = catalog
            .names()
            .iter()
            .map(|name| match status.get(name) {
                Some(ProbeStatus::Installed { location }) => json!({
                    "name": name,
                    "status": "installed",
                    "location": location,
                }),
                Some(ProbeStatus::Indeterminate(e)) => json!({
                    "name": name,
                    "status": "unknown",
                    "detail": e.to_string(),
                }),
                Some(ProbeStatus::NotInstalled) => json!({
                    "name": name,
                    "status": "missing",
                }),
                None => json!({
                    "name": name,
                    "status": "unavailable",
                    "detail": catalog.failure(name).map(|f| f.error.to_string()),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if catalog.names().is_empty() {
        println!("No tool definitions");
        return Ok(ExitCode::SUCCESS);
    }
    for name in catalog.names() {
        match status.get(name) {
            Some(ProbeStatus::Installed { location }) => {
                println!("[{}] {} - {}", "Installed".bright_green(), name, location.display());
            }
            Some(ProbeStatus::NotInstalled) => {
                println!("[{}] {}", ":Missing:".bright_magenta(), name);
            }
            Some(ProbeStatus::Indeterminate(e)) => {
                println!("[{}] {} ({})", "Unknown".yellow(), name, e);
            }
            None => {
                let reason = catalog
                    .failure(name)
                    .map(|f| f.error.to_string())
                    .unwrap_or_default();
                println!("[{}] {} ({})", "Broken".red(), name, reason);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn execute_which(installer: &Installer, name: &str) -> Result<ExitCode> {
    if !installer.catalog().is_known(name) {
        bail!("Unknown tool: {}", name);
    }
    match installer.locate(name) {
        Some(location) => {
            println!("{}", location.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("{} is not installed", name);
            Ok(ExitCode::FAILURE)
        }
    }
}
