//! speedlog - periodic internet speed measurements with a web dashboard

mod config;
mod network;
mod output;
mod testing;
#[cfg(feature = "png-charts")]
mod charts;

use anyhow::{Context, Result};
use clap::Parser;
use network::IpApiClient;
use speedlog_core::{MeasurementRunner, ResultStore, Scheduler};
use speedlog_dashboard::DashboardState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use testing::HttpProvider;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speedlog")]
#[command(version)]
#[command(about = "Internet speed measurements with history and dashboard", long_about = None)]
struct Args {
    /// Configuration file path (optional, defaults apply when missing)
    #[arg(short, long, default_value = "speedlog.toml")]
    config: PathBuf,

    /// List all stored results
    #[arg(long)]
    list: bool,

    /// Show the nearest servers with their latency
    #[arg(long)]
    servers: bool,

    /// Run the test against this server id
    #[arg(long)]
    server_id: Option<String>,

    /// Start the web dashboard
    #[arg(long)]
    web: bool,

    /// Dashboard port
    #[arg(long)]
    port: Option<u16>,

    /// Run a test every N minutes
    #[arg(long)]
    interval: Option<u64>,

    /// Number of records for charts and listings
    #[arg(long)]
    limit: Option<usize>,

    /// Export all results as CSV
    #[arg(long)]
    export: bool,

    /// Render the trend as a PNG chart
    #[arg(long)]
    chart: bool,

    /// Output file for export/chart
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load_or_default(&args.config)?;
    if let Some(port) = args.port {
        config.dashboard.port = port;
    }
    if let Some(interval) = args.interval {
        config.general.interval_minutes = interval;
    }
    if let Some(limit) = args.limit {
        if limit == 0 {
            anyhow::bail!("--limit must be at least 1");
        }
        config.dashboard.chart_limit = limit;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .with_context(|| format!("Invalid log level: {}", config.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("speedlog v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.general.database_path);

    if let Some(mode) = server_id_conflict(&args, config.general.interval_minutes) {
        anyhow::bail!("--server-id only applies to a single test run, not to {}", mode);
    }

    let store = ResultStore::new(&config.general.database_path, config.timeouts.store_busy());
    store
        .initialize()
        .with_context(|| format!("Failed to open database {}", config.general.database_path))?;

    if args.list {
        run_list(&store, args.limit)
    } else if args.export {
        run_export(&store, &args)
    } else if args.chart {
        run_chart(&config, &store, &args)
    } else if args.servers {
        run_servers(&config, store).await
    } else if args.web {
        run_web(&config, store).await
    } else if config.general.interval_minutes > 0 {
        run_scheduled(&config, store).await
    } else {
        run_once(&config, store, args.server_id.as_deref()).await
    }
}

/// Mode flag that would ignore `--server-id`, if both are given
fn server_id_conflict(args: &Args, interval_minutes: u64) -> Option<&'static str> {
    args.server_id.as_ref()?;

    if args.list {
        Some("--list")
    } else if args.export {
        Some("--export")
    } else if args.chart {
        Some("--chart")
    } else if args.servers {
        Some("--servers")
    } else if args.web {
        Some("--web")
    } else if interval_minutes > 0 {
        Some("--interval")
    } else {
        None
    }
}

struct Measurer {
    runner: Arc<MeasurementRunner>,
    geo: Arc<IpApiClient>,
}

fn build_measurer(config: &config::Config, store: ResultStore) -> Result<Measurer> {
    let geo = Arc::new(IpApiClient::new(
        &config.provider,
        config.timeouts.geolocation(),
    )?);
    let provider = HttpProvider::new(
        &config.provider,
        geo.clone(),
        Duration::from_secs(config.timeouts.latency_secs),
    )?;
    let runner = MeasurementRunner::new(
        Arc::new(provider),
        store,
        config.timeouts.phase_timeouts(),
    );

    Ok(Measurer {
        runner: Arc::new(runner),
        geo,
    })
}

fn run_list(store: &ResultStore, limit: Option<usize>) -> Result<()> {
    let records = match limit {
        Some(limit) => store.list_recent(limit)?,
        None => store.list_all()?,
    };
    output::print_records(&records)
}

fn run_export(store: &ResultStore, args: &Args) -> Result<()> {
    let records = store.list_all()?;
    info!("Found {} results", records.len());

    let output_path = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "speedlog_export_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    output::export_csv(&records, &output_path)?;
    info!("Exported to {:?}", output_path);

    Ok(())
}

#[cfg(feature = "png-charts")]
fn run_chart(config: &config::Config, store: &ResultStore, args: &Args) -> Result<()> {
    let series = speedlog_core::TrendAggregator::new(store.clone()).get_trend(config.dashboard.chart_limit)?;
    info!("Charting {} results", series.len());

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("speedlog_trend.png"));

    charts::generate_trend_chart(
        &series,
        &output_path,
        config.export.chart_width,
        config.export.chart_height,
    )?;
    info!("Chart saved to {:?}", output_path);

    Ok(())
}

#[cfg(not(feature = "png-charts"))]
fn run_chart(_config: &config::Config, _store: &ResultStore, _args: &Args) -> Result<()> {
    anyhow::bail!("PNG charts are not available in this build (feature png-charts)")
}

async fn run_servers(config: &config::Config, store: ResultStore) -> Result<()> {
    let measurer = build_measurer(config, store)?;
    let survey = measurer
        .runner
        .survey_servers(50)
        .await
        .context("Failed to list servers")?;
    output::print_survey(&survey)
}

async fn run_once(config: &config::Config, store: ResultStore, server_id: Option<&str>) -> Result<()> {
    let measurer = build_measurer(config, store)?;
    let record = measurer
        .runner
        .run(server_id)
        .await
        .context("Speed test failed")?;
    output::print_record(&record);
    Ok(())
}

async fn run_scheduled(config: &config::Config, store: ResultStore) -> Result<()> {
    let measurer = build_measurer(config, store)?;
    let handle = Scheduler::from_minutes(measurer.runner, config.general.interval_minutes)
        .spawn(config.timeouts.shutdown_grace());

    info!("Scheduler running (Press Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn run_web(config: &config::Config, store: ResultStore) -> Result<()> {
    let measurer = build_measurer(config, store)?;

    let interval = if config.general.interval_minutes > 0 {
        config.general.interval_minutes
    } else {
        config.dashboard.default_interval_minutes
    };
    let scheduler = Scheduler::from_minutes(measurer.runner.clone(), interval)
        .spawn(config.timeouts.shutdown_grace());

    let addr = format!("{}:{}", config.dashboard.bind_address, config.dashboard.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {}", addr))?;

    let state = DashboardState::new(measurer.runner, measurer.geo)
        .with_default_limit(config.dashboard.chart_limit);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(speedlog_dashboard::serve(listener, state, async move {
        let _ = shutdown_rx.changed().await;
    }));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Shutting down");
            let _ = shutdown_tx.send(true);
            scheduler.shutdown().await;
            server
                .await
                .context("Dashboard task failed")?
                .context("Dashboard server failed")?;
        }
        result = &mut server => {
            error!("Dashboard stopped unexpectedly");
            scheduler.shutdown().await;
            result
                .context("Dashboard task failed")?
                .context("Dashboard server failed")?;
        }
    }

    Ok(())
}
