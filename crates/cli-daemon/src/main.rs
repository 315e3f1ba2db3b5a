//! CLI entry point for hookd
//!
//! Parses command line arguments, starts the daemon, runs the requested jobs
//! to completion and prints a summary.

use clap::{Parser, ValueEnum};
use hookd::metrics_server::DEFAULT_METRICS_ADDR;
use hookd::{Config, Daemon, JobOutcome, JobStatus, ScriptedDaemonHandler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// hookd - job lifecycle hook daemon
#[derive(Parser, Debug)]
#[command(name = "hookd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hookd.toml")]
    config: PathBuf,

    /// Job definition to run (repeatable). Defaults to every defined job.
    #[arg(short, long = "job")]
    jobs: Vec<String>,

    /// Listen address of the metrics endpoint
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Do not serve metrics
    #[arg(long, default_value = "false")]
    no_metrics: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Skip startup checks. For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

fn print_summary(daemon: &Daemon, outcomes: &[JobOutcome]) {
    println!("{} job(s) run", outcomes.len());
    for outcome in outcomes {
        println!(
            "  JobId={} Job={} Client={} Status={} ({}) Bytes={} Volumes={}",
            outcome.job_id,
            outcome.job_name,
            outcome.client,
            outcome.status,
            outcome.status.code(),
            outcome.bytes,
            outcome.volumes.join(",")
        );
        if let Some(report) = daemon.take_report(outcome.job_id) {
            for line in report.lines() {
                println!("    {}", line);
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);

    tracing::info!(config = %args.config.display(), "hookd starting");

    let daemon_result = if args.skip_checks {
        tracing::warn!("Skipping startup checks (--skip-checks enabled)");
        Config::load(&args.config)
            .map_err(Into::into)
            .and_then(Daemon::new_without_checks)
    } else {
        Daemon::new(&args.config).await
    };

    let daemon = match daemon_result {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    daemon.set_daemon_events(Arc::new(ScriptedDaemonHandler::new(
        daemon.config.resubmit.clone(),
        daemon.config.handler.clone(),
    )));

    if !args.no_metrics {
        let addr = args
            .metrics_addr
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_METRICS_ADDR));
        let _server = daemon.start_metrics_server(addr);
        let _updater = daemon.start_metrics_updater();
    }

    let names: Vec<String> = if args.jobs.is_empty() {
        daemon
            .config
            .job_definitions
            .iter()
            .map(|d| d.name.clone())
            .collect()
    } else {
        args.jobs.clone()
    };

    let mut rejected = 0;
    for name in &names {
        if let Err(e) = daemon.submit_named(name) {
            tracing::error!(job = %name, error = %e, "Job not submitted");
            rejected += 1;
        }
    }

    let outcomes = daemon.run_until_idle().await;
    daemon.shutdown().await;
    print_summary(&daemon, &outcomes);

    let unsuccessful = outcomes
        .iter()
        .filter(|o| matches!(o.status, JobStatus::Failed | JobStatus::AbortedByHook))
        .count();
    // Also counts jobs whose context could not be created
    let failed_jobs = daemon.metrics().read().await.failed_jobs;

    if rejected > 0 || unsuccessful > 0 || failed_jobs > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
