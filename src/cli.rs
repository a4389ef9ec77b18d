//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Args, Parser, Subcommand};

use crate::client::USGS_BASE_URL;
use crate::errors::SeismodashError;
use crate::output::Format;
use crate::query::{FilterConfig, GeoRadius, ResultLimit, TimeRange};

/// Seismic activity dashboard backed by the USGS event feed.
#[derive(Parser, Debug)]
#[command(name = "seismodash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the dashboard web server with periodic refresh
    Serve(ServeArgs),

    /// Fetch once and print summary statistics and distributions
    Stats(FetchArgs),

    /// Fetch once and print the most recent events
    Events(EventsArgs),

    /// Print the feed query URL for a filter configuration
    Url(UrlArgs),
}

/// Filter selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Look-back window: hour, day, week, month (unknown values mean day)
    #[arg(long, default_value = "day", value_parser = parse_time_range)]
    pub time_range: TimeRange,

    /// Minimum magnitude (0-10)
    #[arg(long, default_value = "2.5")]
    pub min_magnitude: Option<f64>,

    /// Request events of any magnitude, overriding --min-magnitude
    #[arg(long, conflicts_with = "min_magnitude")]
    pub any_magnitude: bool,

    /// Maximum magnitude (0-10)
    #[arg(long)]
    pub max_magnitude: Option<f64>,

    /// Maximum number of events: 50, 100, 250 or 500
    #[arg(long, short = 'n', default_value = "100", value_parser = parse_limit)]
    pub limit: ResultLimit,

    /// Radius filter: lat,lon,radius_km
    #[arg(long, value_parser = parse_radius)]
    pub radius: Option<GeoRadius>,

    /// Minimum depth in km
    #[arg(long)]
    pub min_depth: Option<f64>,

    /// Maximum depth in km
    #[arg(long)]
    pub max_depth: Option<f64>,
}

impl FilterArgs {
    /// Build a validated filter configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any bound is out of its domain.
    pub fn to_config(&self) -> Result<FilterConfig, SeismodashError> {
        let mut config = FilterConfig {
            time_range: self.time_range,
            min_magnitude: if self.any_magnitude { None } else { self.min_magnitude },
            max_magnitude: self.max_magnitude,
            limit: self.limit,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            ..FilterConfig::default()
        };
        if let Some(radius) = self.radius {
            config = config.with_radius(radius);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for one-shot fetches.
#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Feed base URL
    #[arg(long, default_value = USGS_BASE_URL)]
    pub base_url: String,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `events` command.
#[derive(Args, Debug)]
pub struct EventsArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Number of recent events to print
    #[arg(long, default_value = "10")]
    pub count: usize,
}

/// Arguments for the `url` command.
#[derive(Args, Debug)]
pub struct UrlArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Feed base URL
    #[arg(long, default_value = USGS_BASE_URL)]
    pub base_url: String,
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Feed base URL
    #[arg(long, default_value = USGS_BASE_URL)]
    pub base_url: String,

    /// Refresh interval in seconds (default 300, minimum 30)
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Parse a time range, falling back to a day.
#[allow(clippy::unnecessary_wraps)]
fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    Ok(TimeRange::parse_lenient(s))
}

/// Parse a result limit from string.
fn parse_limit(s: &str) -> Result<ResultLimit, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a radius filter from string.
fn parse_radius(s: &str) -> Result<GeoRadius, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_filter_defaults() {
        let cli = Cli::parse_from(["seismodash", "url"]);
        let Command::Url(args) = cli.command else {
            panic!("expected url command");
        };
        assert_eq!(args.filter.to_config().unwrap(), FilterConfig::default());
    }

    #[test]
    fn test_filter_flags() {
        let cli = Cli::parse_from([
            "seismodash",
            "stats",
            "--time-range",
            "week",
            "--min-magnitude",
            "0",
            "--limit",
            "250",
            "--radius",
            "37.77,-122.41,500",
        ]);
        let Command::Stats(args) = cli.command else {
            panic!("expected stats command");
        };
        let config = args.filter.to_config().unwrap();
        assert_eq!(config.time_range, TimeRange::Week);
        assert_eq!(config.min_magnitude, Some(0.0));
        assert_eq!(config.limit, ResultLimit::Top250);
        assert_eq!(config.radius_km, Some(500.0));
    }

    #[test]
    fn test_unknown_time_range_and_any_magnitude() {
        let cli = Cli::parse_from(["seismodash", "url", "--time-range", "decade", "--any-magnitude"]);
        let Command::Url(args) = cli.command else {
            panic!("expected url command");
        };
        let config = args.filter.to_config().unwrap();
        assert_eq!(config.time_range, TimeRange::Day);
        assert_eq!(config.min_magnitude, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Cli::try_parse_from(["seismodash", "url", "--limit", "75"]).is_err());

        let cli = Cli::parse_from(["seismodash", "url", "--max-magnitude", "11"]);
        let Command::Url(args) = cli.command else {
            panic!("expected url command");
        };
        assert!(args.filter.to_config().is_err());
    }
}
