//! Netscope command line
//!
//! Submits scan jobs to a local driver and queries their state from the
//! job database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netscope_core::{AppConfig, ScanOptions};
use netscope_db::{scan_jobs, Database};
use netscope_jobs::{JobDriver, ScanRequest};
use netscope_scanner::ProcessRunner;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Netscope scan orchestrator
#[derive(Parser, Debug)]
#[command(name = "netscope")]
#[command(version)]
#[command(about = "Run network, vulnerability and traffic scans as tracked jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a scan job and wait for it to finish
    Scan {
        /// Scan type (full, network, vulnerability, network_analysis)
        #[arg(long = "type")]
        scan_type: String,

        /// Host, address or network to scan
        #[arg(long)]
        target: String,

        /// Scanner parameter as key=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Owner recorded on the job
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Show a job's status
    Status {
        /// Job id
        job_id: String,
    },

    /// Show a job's results
    Results {
        /// Job id
        job_id: String,
    },

    /// List jobs of an owner, newest first
    List {
        /// Owner to list
        #[arg(long, default_value = "local")]
        owner: String,
    },
}

/// Split `key=value`. Values that parse as JSON keep their type.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,netscope=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::load_with_env().context("failed to load configuration")?;
    let db_path = config.database_path()?;
    let database = Database::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    match cli.command {
        Command::Scan {
            scan_type,
            target,
            params,
            owner,
        } => {
            let driver = JobDriver::new(
                Arc::new(database.clone()),
                Arc::new(ProcessRunner::new()),
                config,
            );
            let request = ScanRequest::new(scan_type, target)
                .with_parameters(params.into_iter().collect::<ScanOptions>());
            let handle = driver.submit(&request, &owner).await?;
            info!(job_id = %handle.job.id, "Submitted scan job");
            print_json(&handle.job)?;

            let job_id = handle.job.id.clone();
            tokio::select! {
                finished = handle.completion => {
                    finished.context("scan job driver panicked")??;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling active scans");
                    driver.shutdown().await;
                }
            }

            print_json(&driver.results(&job_id).await?)?;
        }
        Command::Status { job_id } => {
            let job = scan_jobs::get_scan_job(database.pool(), &job_id).await?;
            print_json(&job)?;
        }
        Command::Results { job_id } => {
            let driver = JobDriver::new(
                Arc::new(database.clone()),
                Arc::new(ProcessRunner::new()),
                config,
            );
            print_json(&driver.results(&job_id).await?)?;
        }
        Command::List { owner } => {
            let jobs = scan_jobs::list_scan_jobs(database.pool(), &owner).await?;
            print_json(&jobs)?;
        }
    }

    database.close().await;
    Ok(())
}
