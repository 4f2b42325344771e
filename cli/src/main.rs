//! netsweep — run network diagnostics against many targets at once
//!
//! Collects targets from the command line, a targets file or a device
//! inventory, runs one diagnostic per target on the engine's worker pool and
//! reports every outcome. Exits 0 when every target succeeded, otherwise with
//! the number of failed targets (capped at 255).

mod cli;
mod config;
mod inventory;
mod targets;

use anyhow::{Context, Result};
use clap::Parser;
use netsweep_engine::report::{write_outputs, write_report, write_report_file, write_transcript};
use netsweep_engine::{
    CancellationToken, Dispatcher, Executor, Platform, RunReport, Status, TargetResult,
    DEFAULT_MAX_PARALLEL,
};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{config_source, load_config, NetsweepConfig};
use crate::inventory::{load_inventory, Selection};
use crate::targets::{build_targets, dedupe, read_targets_file, CommandSource, TargetSpec};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let level = match &config {
        _ if cli.quiet => "warn",
        Ok(config) => config.logging.level.as_str(),
        Err(_) => "info",
    };
    if let Err(e) = init_logging(level, cli.quiet) {
        eprintln!("netsweep: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("netsweep: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: NetsweepConfig) -> Result<ExitCode> {
    match &config.source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => warn!(
            "Config file not found at {}, using defaults",
            config_source(cli.config.as_deref()).display()
        ),
    }

    let specs = dedupe(collect_specs(&cli)?);
    if specs.is_empty() {
        anyhow::bail!("No targets given: pass hosts, --targets-file or --inventory");
    }

    let source = if cli.command.is_empty() {
        CommandSource::Table {
            table: config.command_table()?,
            kind: cli.kind,
            platform: Platform::current(),
        }
    } else {
        CommandSource::Template(cli.command.clone())
    };

    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.run.timeout());
    let grace = cli
        .grace_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.run.grace());
    let max_parallel = cli
        .max_parallel
        .or(config.run.max_parallel)
        .unwrap_or(DEFAULT_MAX_PARALLEL);

    let targets = build_targets(&specs, &source, timeout)?;
    let dispatcher = Dispatcher::new(Executor::new(grace)).with_max_parallel(max_parallel);
    spawn_signal_handler(dispatcher.cancel_handle());

    let total = targets.len();
    let mut done = 0;
    let report = dispatcher
        .run_with_observer(targets, |result| {
            done += 1;
            print_status(done, total, result);
        })
        .await
        .context("Run failed")?;

    print_summary(&report);
    write_sinks(&cli, &report)?;
    Ok(ExitCode::from(report.exit_code()))
}

/// Targets from every source, in the order given
fn collect_specs(cli: &Cli) -> Result<Vec<TargetSpec>> {
    let mut specs: Vec<TargetSpec> = cli.targets.iter().map(|t| TargetSpec::host(t)).collect();

    if let Some(path) = &cli.targets_file {
        specs.extend(read_targets_file(path)?.iter().map(|t| TargetSpec::host(t)));
    }

    if let Some(path) = &cli.inventory {
        let inventory = load_inventory(path)?;
        let selection = Selection {
            site: cli.site.clone(),
            category: cli.category.clone(),
            host: cli.host.clone(),
        };
        let devices = inventory
            .select(&selection)
            .with_context(|| format!("Invalid selection from {}", path.display()))?;
        info!("Selected {} devices from {}", devices.len(), path.display());
        specs.extend(devices.into_iter().map(TargetSpec::from));
    }

    Ok(specs)
}

fn write_sinks(cli: &Cli, report: &RunReport) -> Result<()> {
    if let Some(path) = &cli.report {
        if path == Path::new("-") {
            let stdout = std::io::stdout();
            write_report(report, &mut stdout.lock()).context("Failed to write report")?;
        } else {
            write_report_file(report, path).context("Failed to write report")?;
        }
    }
    if let Some(path) = &cli.transcript {
        write_transcript(report, path).context("Failed to write transcript")?;
    }
    if let Some(dir) = &cli.output_dir {
        let written = write_outputs(report, dir).context("Failed to save target output")?;
        info!("Saved output of {} targets to {}", written.len(), dir.display());
    }
    Ok(())
}

fn print_status(done: usize, total: usize, result: &TargetResult) {
    let width = total.to_string().len();
    let mut line = format!(
        "[{done:>width$}/{total}] {:<10} {} ({} lines, {:.1}s)",
        result.status().as_str(),
        result.target_id(),
        result.output().len(),
        result.duration().as_secs_f64(),
    );
    if let Some(error) = result.error() {
        line.push_str(": ");
        line.push_str(error);
    }
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

fn print_summary(report: &RunReport) {
    println!(
        "{} targets: {} succeeded, {} failed ({} timed out, {} cancelled)",
        report.total(),
        report.succeeded(),
        report.failed(),
        report.count(Status::TimedOut),
        report.count(Status::Cancelled),
    );
}

/// Ctrl-C (or SIGTERM) cancels everything still running
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        res = tokio::signal::ctrl_c() => {
                            if let Err(e) = res {
                                error!("Failed to listen for SIGINT: {e}");
                                return;
                            }
                            warn!("Received SIGINT, cancelling run...");
                        }
                        _ = sigterm.recv() => warn!("Received SIGTERM, cancelling run..."),
                    }
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {e}");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for SIGINT: {e}");
                        return;
                    }
                    warn!("Received SIGINT, cancelling run...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
                return;
            }
            warn!("Received Ctrl-C, cancelling run...");
        }
        cancel.cancel();
    });
}

fn init_logging(level: &str, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::try_new(level)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))
    }
    .with_context(|| format!("Invalid log level {level:?}"))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}
