mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use batchfetch_engine::{
    CombinedReport, EngineEvent, EngineHandle, FetchEvent, JobId, ReqwestHttpCaller,
};
use chrono::Utc;
use clap::Parser;
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn, LogDestination};
use log::LevelFilter;

use crate::config::AppConfig;
use crate::output::{write_atomic, DatasetDocument};

const JOB_ID: JobId = 1;

/// Pull a complete dataset from a paginated JSON API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// RON configuration file describing the endpoint and streams.
    config: PathBuf,
    /// Write the merged dataset here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match &cli.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(destination, level);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            engine_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(&cli.config)?;
    let fetch_config = config.fetch_config()?;
    let caller = ReqwestHttpCaller::new(config.caller_settings())?;
    let engine = EngineHandle::new(Arc::new(caller), fetch_config)
        .context("failed to start engine runtime")?;

    let cancel = engine.cancellation_token();
    ctrlc::set_handler(move || {
        engine_warn!("Interrupted; finishing current pages");
        cancel.cancel();
    })
    .context("failed to install interrupt handler")?;

    engine.enqueue(JOB_ID, config.dataset_job());
    let report = wait_for_report(&engine)?;

    let fetched_at = Utc::now().to_rfc3339();
    let json = DatasetDocument::new(&report, fetched_at).to_json()?;
    match &cli.output {
        Some(path) => {
            write_atomic(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            engine_info!("Wrote {} records to {}", report.records.len(), path.display());
        }
        None => println!("{json}"),
    }

    let failed = report.failed_streams();
    if !failed.is_empty() {
        engine_warn!(
            "{} of {} streams failed: {}",
            failed.len(),
            report.streams.len(),
            failed.join(", ")
        );
    }

    Ok(if report.all_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn wait_for_report(engine: &EngineHandle) -> anyhow::Result<CombinedReport> {
    while let Some(event) = engine.recv() {
        match event {
            EngineEvent::Fetch(FetchEvent::RequestIssued {
                stream,
                request,
                offset,
                batch_size,
                total,
            }) => {
                engine_debug!(
                    "{}: request {} offset {} size {} ({} so far)",
                    stream,
                    request,
                    offset,
                    batch_size,
                    total
                );
            }
            EngineEvent::Fetch(_) => {}
            EngineEvent::JobCompleted { job_id, report } if job_id == JOB_ID => {
                return Ok(report);
            }
            EngineEvent::JobCompleted { job_id, .. } => {
                engine_warn!("Ignoring completion for unknown job {}", job_id);
            }
        }
    }
    bail!("engine stopped before the job completed")
}
