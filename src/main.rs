//! CLI entry point for the fleet operations KPI service.
//!
//! Provides subcommands for serving the HTTP API, writing KPI snapshots to
//! disk (and optionally S3), and checking row-source connectivity.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fleet_kpi::charts::{ChartStore, FileChartBackend};
use fleet_kpi::config::KpiSettings;
use fleet_kpi::dataset::parse_date_param;
use fleet_kpi::engine::KpiEngine;
use fleet_kpi::envelope::KpiEnvelope;
use fleet_kpi::export::{
    print_json, print_pretty, prune_snapshots, snapshot_file_name, write_json_to_s3,
    write_snapshot,
};
use fleet_kpi::server::{AppState, router, serve};
use fleet_kpi::source::{CsvTripSource, PgTripSource, TripSource};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "fleet_kpi")]
#[command(about = "Logistics operations KPI service", long_about = None)]
struct Cli {
    /// JSON file overriding KPI thresholds and engine options
    #[arg(long, env = "KPI_SETTINGS", global = true)]
    settings: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// PostgreSQL connection URL. When unset, trips are read from CSV files
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory containing trips.csv, vehicles.csv and transporters.csv
    #[arg(long, env = "KPI_DATA_DIR", default_value = "data")]
    data_dir: String,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the KPI and chart API over HTTP
    Serve {
        #[command(flatten)]
        source: SourceArgs,

        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,

        /// Directory where saved charts are stored
        #[arg(long, env = "CHARTS_DIR", default_value = "charts")]
        charts_dir: String,

        /// Keep charts in memory instead of on disk
        #[arg(long, default_value_t = false)]
        in_memory_charts: bool,

        /// Per-request timeout in seconds
        #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
        request_timeout_secs: u64,
    },
    /// Compute all KPIs once and write the response as a JSON snapshot
    Snapshot {
        #[command(flatten)]
        source: SourceArgs,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Last day of the range (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,

        /// Directory to write snapshots to
        #[arg(short = 'd', long, default_value = "kpi_data")]
        output_dir: String,

        /// Number of snapshots to keep in the output directory
        #[arg(long, default_value_t = 5)]
        keep: usize,

        /// Optional: S3 bucket to upload the snapshot to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix for S3 uploads
        #[arg(long, default_value = "snapshots")]
        s3_prefix: String,

        /// Optional: Gzip compress the snapshot before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Also log the snapshot as JSON
        #[arg(long, default_value_t = false)]
        print: bool,
    },
    /// Check that the trip data source is reachable
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fleet_kpi.log".to_string());
    let log_dir = Path::new(&log_file_path).parent().unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("fleet_kpi.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = KpiSettings::load_or_default(cli.settings.as_deref())?;

    match cli.command {
        Commands::Serve {
            source,
            bind,
            charts_dir,
            in_memory_charts,
            request_timeout_secs,
        } => {
            let engine = Arc::new(KpiEngine::new(build_source(&source).await?, settings));
            let charts = if in_memory_charts {
                info!("Charts are kept in memory");
                ChartStore::in_memory()
            } else {
                ChartStore::new(Arc::new(FileChartBackend::open(&charts_dir).await?))
            };

            let timeout = Duration::from_secs(request_timeout_secs);
            let app = router(AppState { engine, charts }, timeout);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            serve(listener, app).await?;
        }
        Commands::Snapshot {
            source,
            start_date,
            end_date,
            output_dir,
            keep,
            s3_bucket,
            s3_prefix,
            gzip,
            print,
        } => {
            let engine = KpiEngine::new(build_source(&source).await?, settings);
            let start = parse_date_param("start_date", start_date.as_deref())?;
            let end = parse_date_param("end_date", end_date.as_deref())?;

            snapshot(
                &engine,
                start,
                end,
                &output_dir,
                keep,
                s3_bucket,
                &s3_prefix,
                gzip,
                print,
            )
            .await?;
        }
        Commands::Check { source } => {
            let source = build_source(&source).await?;
            let name = source.describe();
            source
                .ping()
                .await
                .with_context(|| format!("trip source {name} is unreachable"))?;
            info!(source = %name, "Trip source reachable");
        }
    }

    Ok(())
}

/// Connects to PostgreSQL when a URL is configured, otherwise reads CSV files.
async fn build_source(args: &SourceArgs) -> Result<Arc<dyn TripSource>> {
    match &args.database_url {
        Some(url) if !url.trim().is_empty() => {
            let source = PgTripSource::connect(url, args.max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            Ok(Arc::new(source))
        }
        _ => {
            info!(dir = %args.data_dir, "Reading trips from CSV");
            Ok(Arc::new(CsvTripSource::new(&args.data_dir)))
        }
    }
}

/// Runs one extraction, writes it locally, prunes old snapshots and
/// optionally uploads the new one to S3.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(engine, s3_bucket, gzip, print))]
async fn snapshot(
    engine: &KpiEngine,
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
    output_dir: &str,
    keep: usize,
    s3_bucket: Option<String>,
    s3_prefix: &str,
    gzip: bool,
    print: bool,
) -> Result<()> {
    let report = engine.extract(start, end).await?;
    let envelope = KpiEnvelope::from_report(report);
    if !envelope.success {
        warn!(message = %envelope.message, "Snapshot contains no KPIs");
    }

    print_pretty(&envelope);
    if print {
        print_json(&envelope)?;
    }

    let path = write_snapshot(Path::new(output_dir), &envelope, envelope.extraction_timestamp)?;
    let removed = prune_snapshots(Path::new(output_dir), keep)?;
    info!(path = %path.display(), pruned = removed.len(), "Snapshot saved");

    if let Some(bucket) = s3_bucket {
        let config = aws_config::load_from_env().await;
        let s3 = aws_sdk_s3::Client::new(&config);
        let key = format!(
            "{}/{}",
            s3_prefix.trim_end_matches('/'),
            snapshot_file_name(envelope.extraction_timestamp)
        );
        write_json_to_s3(&s3, &bucket, &key, &envelope, gzip).await?;
    }

    Ok(())
}
