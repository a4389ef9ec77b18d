//! seismodash - Seismic activity dashboard.
//!
//! Polls the USGS event feed on a fixed interval, keeps the latest result as
//! an immutable snapshot, and serves aggregated views (summary statistics,
//! magnitude and depth distributions, hourly activity, recent events) over
//! HTTP or prints them from the terminal.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::error;

mod aggregate;
mod cli;
mod client;
mod errors;
mod models;
mod output;
mod query;
mod refresh;
mod server;

use aggregate::{DashboardView, recent_events};
use cli::{Cli, Command};
use client::UsgsClient;
use models::Snapshot;
use query::build_query;

/// Lower bound on the refresh interval.
const MIN_REFRESH_SECS: u64 = 30;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Stats(args) => cmd_stats(&args),
        Command::Events(args) => cmd_events(&args),
        Command::Url(args) => cmd_url(&args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to create tokio runtime")
}

/// Fetch one snapshot for the one-shot commands.
fn fetch_snapshot(args: &cli::FetchArgs) -> Result<Snapshot> {
    let config = args.filter.to_config().context("invalid filter")?;
    let rt = runtime()?;
    let client = UsgsClient::with_base_url(&args.base_url).context("failed to create USGS client")?;
    let query = build_query(&config, Utc::now());

    let events = rt
        .block_on(client.query_events(&query))
        .context("failed to fetch earthquake feed")?;
    Ok(Snapshot::new(events))
}

/// Execute the `stats` command - one-shot fetch and aggregate.
fn cmd_stats(args: &cli::FetchArgs) -> Result<()> {
    let snapshot = fetch_snapshot(args)?;
    let view = DashboardView::build(&snapshot, Utc::now());

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_dashboard(&mut handle, &view, args.format)?;
    Ok(())
}

/// Execute the `events` command - one-shot fetch of the most recent events.
fn cmd_events(args: &cli::EventsArgs) -> Result<()> {
    let snapshot = fetch_snapshot(&args.fetch)?;
    if snapshot.is_empty() {
        tracing::info!("no earthquakes match the filter");
    }
    let events = recent_events(&snapshot, args.count);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, args.fetch.format)?;
    Ok(())
}

/// Execute the `url` command - show the query a configuration produces.
fn cmd_url(args: &cli::UrlArgs) -> Result<()> {
    let config = args.filter.to_config().context("invalid filter")?;
    let url = build_query(&config, Utc::now()).to_url(&args.base_url)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{url}")?;
    Ok(())
}

/// Execute the `serve` command - start the refresh controller and web server.
fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let requested = args
        .refresh_secs
        .unwrap_or(refresh::DEFAULT_REFRESH_PERIOD.as_secs());
    let refresh_secs = requested.max(MIN_REFRESH_SECS);
    if refresh_secs != requested {
        tracing::warn!("refresh interval clamped to minimum of {} seconds", MIN_REFRESH_SECS);
    }

    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        base_url: args.base_url.clone(),
        refresh_period: Duration::from_secs(refresh_secs),
        filter: args.filter.to_config().context("invalid filter")?,
    };

    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 seismodash\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Window:  {}", config.filter.time_range);
    println!("  Refresh: {refresh_secs}s");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    runtime()?.block_on(server::run_server(config))
}
