//! Output formatters for events and dashboard views.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::aggregate::{DashboardView, MagnitudeBand, classify_magnitude};
use crate::models::{OutputEvent, SeismicEvent};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Magnitude band colors
const RED: &str = "\x1b[91m"; // major
const ORANGE: &str = "\x1b[38;5;208m"; // strong
const YELLOW: &str = "\x1b[93m"; // moderate
const CYAN: &str = "\x1b[96m"; // light
const GREEN: &str = "\x1b[92m"; // minor
const WHITE: &str = "\x1b[97m"; // unknown

const ICON_QUAKE: &str = "🌍";

/// Widest bar drawn in the human summary.
const BAR_WIDTH: usize = 40;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON document
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

fn band_color(band: Option<MagnitudeBand>) -> &'static str {
    match band {
        Some(MagnitudeBand::Major) => RED,
        Some(MagnitudeBand::Strong) => ORANGE,
        Some(MagnitudeBand::Moderate) => YELLOW,
        Some(MagnitudeBand::Light) => CYAN,
        Some(MagnitudeBand::Minor) => GREEN,
        None => WHITE,
    }
}

fn band_label(band: Option<MagnitudeBand>) -> String {
    band.map_or_else(|| "UNKNOWN".into(), |b| b.as_str().to_uppercase())
}

fn to_json_line<T: Serialize + ?Sized>(value: &T) -> io::Result<String> {
    serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> io::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write events in human-readable format, one line each.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[SeismicEvent]) -> io::Result<()> {
    for event in events {
        let time = event
            .time()
            .map_or_else(|| "unknown".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());

        let band = event.magnitude.map(classify_magnitude);
        let mag_str = event
            .magnitude
            .map_or_else(|| "?".into(), |m| format!("{m:.1}"));
        let depth = event
            .depth_km
            .map_or_else(|| "  ?".into(), |d| format!("{d:>5.0}"));
        let place = if event.place.is_empty() {
            "Unknown location"
        } else {
            event.place.as_str()
        };
        let felt = if event.felt_reports > 0 {
            format!(" {DIM}({} felt){RESET}", event.felt_reports)
        } else {
            String::new()
        };

        let color = band_color(band);
        let label = band_label(band);

        writeln!(
            writer,
            "{ICON_QUAKE} {color}{BOLD}M{mag_str}{RESET} │ \
             {color}{label:12}{RESET} │ \
             {DIM}{depth}km{RESET} │ \
             {time} UTC │ \
             {place}{felt}"
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[SeismicEvent]) -> io::Result<()> {
    let output: Vec<OutputEvent> = events.iter().map(OutputEvent::from).collect();
    writeln!(writer, "{}", to_json_pretty(&output)?)
}

/// Write events as newline-delimited JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[SeismicEvent]) -> io::Result<()> {
    for event in events {
        writeln!(writer, "{}", to_json_line(&OutputEvent::from(event))?)?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[SeismicEvent], format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    "█".repeat((count * BAR_WIDTH).div_ceil(max).min(BAR_WIDTH))
}

/// Write the dashboard summary as labelled text with bar charts.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_dashboard_human<W: Write>(writer: &mut W, view: &DashboardView) -> io::Result<()> {
    let s = &view.summary;
    writeln!(writer, "{BOLD}Summary{RESET}")?;
    writeln!(writer, "  Total events:    {}", s.total)?;
    writeln!(writer, "  Last 24 hours:   {}", s.count_last_24h)?;
    writeln!(writer, "  Largest:         M{:.1}", s.largest_magnitude)?;
    writeln!(writer, "  Average:         M{:.2}", s.average_magnitude)?;

    let m = &view.magnitude_distribution;
    let bands = [
        (MagnitudeBand::Major, m.major),
        (MagnitudeBand::Strong, m.strong),
        (MagnitudeBand::Moderate, m.moderate),
        (MagnitudeBand::Light, m.light),
        (MagnitudeBand::Minor, m.minor),
    ];
    let max = bands.iter().map(|(_, c)| *c).max().unwrap_or(0);
    writeln!(writer, "\n{BOLD}Magnitude bands{RESET} {DIM}({} with magnitude){RESET}", m.total())?;
    for (band, count) in bands {
        let color = band_color(Some(band));
        writeln!(writer, "  {color}{:<12}{RESET} {count:>5} {color}{}{RESET}", band.as_str(), bar(count, max))?;
    }

    let max = view.depth_bands.iter().map(|b| b.count).max().unwrap_or(0);
    writeln!(writer, "\n{BOLD}Depth{RESET}")?;
    for row in &view.depth_bands {
        writeln!(writer, "  {:<12} {:>5} {DIM}{}{RESET}", row.band, row.count, bar(row.count, max))?;
    }

    let max = view.magnitude_histogram.iter().map(|b| b.count).max().unwrap_or(0);
    writeln!(writer, "\n{BOLD}Magnitude histogram{RESET}")?;
    for bin in view.magnitude_histogram.iter().filter(|b| b.count > 0) {
        writeln!(writer, "  {:>4.1}-{:<4.1}    {:>5} {}", bin.x0, bin.x1, bin.count, bar(bin.count, max))?;
    }

    let max = view.hourly_activity.iter().map(|b| b.count).max().unwrap_or(0);
    writeln!(writer, "\n{BOLD}Hourly activity{RESET}")?;
    for bucket in &view.hourly_activity {
        writeln!(writer, "  {:>3}h ago      {:>5} {}", bucket.hours_ago, bucket.count, bar(bucket.count, max))?;
    }

    writeln!(writer, "\n{BOLD}Most recent{RESET}")?;
    let recent: Vec<SeismicEvent> = view.recent.iter().map(|r| r.event.clone()).collect();
    write_human(writer, &recent)
}

/// Write the dashboard view in the specified format.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_dashboard<W: Write>(writer: &mut W, view: &DashboardView, format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_dashboard_human(writer, view),
        Format::Json => writeln!(writer, "{}", to_json_pretty(view)?),
        Format::Ndjson => writeln!(writer, "{}", to_json_line(view)?),
    }
}
