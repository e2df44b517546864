//! CLI entry point for the daily COVID data pipeline.
//!
//! Pulls the county and state feeds, archives a dated copy of each, and
//! writes the trend, ICU, census, vaccination and age outputs for one run
//! date.

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use covid_pipeline::{
    archive::FsArchiveStore,
    config::PipelineConfig,
    fetch::{BasicClient, FeedFetcher},
    orchestrator::Orchestrator,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "covid_pipeline")]
#[command(about = "Daily county and state COVID data pipeline", long_about = None)]
struct Cli {
    /// JSON config file; built-in defaults are used when omitted
    #[arg(short, long, env = "COVID_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Run date (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/covid_pipeline.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("covid_pipeline.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse::<Directive>()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse::<Directive>()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = PipelineConfig::resolve(cli.config.as_deref())?;
    let run_date = cli.date.unwrap_or_else(|| Local::now().date_naive());
    info!(
        %run_date,
        archive_dir = %config.archive_dir.display(),
        output_dir = %config.output_dir.display(),
        "Starting pipeline run"
    );

    let store = FsArchiveStore::new(&config.archive_dir, config.gzip_archive);
    let client = BasicClient::with_timeout(Duration::from_secs(config.http_timeout_secs))?;
    let mut orchestrator = Orchestrator::new(&config, FeedFetcher::with_client(client), store);
    let report = orchestrator.run(run_date).await?;

    for trend in &report.trends {
        info!(
            region = %trend.region,
            new_cases = trend.new_cases,
            avg_new_cases_7d = ?trend.stats.avg_new_cases_7d,
            icu_percent_full = ?trend.stats.icu_percent_full,
            transmission = ?trend.stats.transmission,
            "Region summary"
        );
    }
    for rising in &report.rising_jurisdictions {
        info!(
            region = %rising.region,
            from = rising.avg_7d_week_ago,
            to = rising.avg_7d,
            "7-day case average rose"
        );
    }
    if let Some(census) = &report.bed_census {
        info!(
            in_use = census.in_use,
            week_ago = ?census.in_use_week_ago,
            two_weeks_ago = ?census.in_use_two_weeks_ago,
            "Statewide med/surg census"
        );
    }

    if !report.succeeded() {
        for failure in &report.failures {
            warn!(error = %failure, "Pipeline did not complete");
        }
        bail!(
            "{} of {} pipelines failed",
            report.failures.len(),
            report.pipelines.len()
        );
    }

    info!("Pipeline run complete");
    Ok(())
}
