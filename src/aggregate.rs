//! Derived views over a snapshot.
//!
//! Every function here is pure: it reads the snapshot and allocates fresh
//! output, never reordering shared storage. An empty snapshot produces
//! zeroed or empty results.
//!
//! Events without a magnitude are left out of every magnitude-based view
//! but still count towards totals and location-based views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{SeismicEvent, Snapshot};

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Magnitude histogram domain and resolution.
pub const HISTOGRAM_MIN: f64 = 0.0;
pub const HISTOGRAM_MAX: f64 = 10.0;
pub const HISTOGRAM_BINS: usize = 20;

/// Number of hourly buckets kept after sorting.
pub const HOURLY_BUCKETS: usize = 24;

/// Default length of the recent-events list.
pub const RECENT_EVENTS: usize = 10;

/// Colour used for events with no reported magnitude.
pub const UNKNOWN_COLOR: &str = "#9ca3af";

/// Named magnitude interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MagnitudeBand {
    Minor,
    Light,
    Moderate,
    Strong,
    Major,
}

impl MagnitudeBand {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
            Self::Major => "major",
        }
    }

    /// Marker colour for map and list renderers.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Major => "#dc2626",
            Self::Strong => "#ea580c",
            Self::Moderate => "#f59e0b",
            Self::Light => "#eab308",
            Self::Minor => "#22c55e",
        }
    }
}

/// Named depth interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthBand {
    Shallow,
    Intermediate,
    Deep,
}

impl DepthBand {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shallow => "shallow",
            Self::Intermediate => "intermediate",
            Self::Deep => "deep",
        }
    }

    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Shallow => "#f97316",
            Self::Intermediate => "#3b82f6",
            Self::Deep => "#7c3aed",
        }
    }
}

/// One band row for renderers: label, count and colour together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandCount {
    pub band: &'static str,
    pub count: usize,
    pub color: &'static str,
}

/// Classify a magnitude. Boundary values belong to the higher band.
#[must_use]
pub fn classify_magnitude(mag: f64) -> MagnitudeBand {
    match mag {
        m if m >= 7.0 => MagnitudeBand::Major,
        m if m >= 6.0 => MagnitudeBand::Strong,
        m if m >= 5.0 => MagnitudeBand::Moderate,
        m if m >= 4.0 => MagnitudeBand::Light,
        _ => MagnitudeBand::Minor,
    }
}

/// Classify a depth in kilometers.
///
/// Events located above sea level report a negative depth; they are shallow.
#[must_use]
pub fn classify_depth(depth_km: f64) -> DepthBand {
    match depth_km {
        d if d >= 300.0 => DepthBand::Deep,
        d if d >= 70.0 => DepthBand::Intermediate,
        _ => DepthBand::Shallow,
    }
}

/// Marker colour for an optional magnitude.
#[must_use]
pub fn magnitude_color(mag: Option<f64>) -> &'static str {
    mag.map_or(UNKNOWN_COLOR, |m| classify_magnitude(m).color())
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SummaryStats {
    pub total: usize,
    pub largest_magnitude: f64,
    pub average_magnitude: f64,
    pub count_last_24h: usize,
}

/// Compute summary statistics relative to `now`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summary_stats(snapshot: &Snapshot, now: DateTime<Utc>) -> SummaryStats {
    let now_ms = now.timestamp_millis();
    let events = snapshot.events();

    let magnitudes: Vec<f64> = events.iter().filter_map(|e| e.magnitude).collect();
    let (largest_magnitude, average_magnitude) = if magnitudes.is_empty() {
        (0.0, 0.0)
    } else {
        let largest = magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
        (largest, average)
    };

    SummaryStats {
        total: events.len(),
        largest_magnitude,
        average_magnitude,
        count_last_24h: events
            .iter()
            .filter(|e| now_ms - e.time_ms < DAY_MS)
            .count(),
    }
}

/// One histogram bin covering `[x0, x1)`; the final bin also includes `x1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub x0: f64,
    pub x1: f64,
    pub count: usize,
}

/// Count magnitudes into 20 half-unit bins over [0, 10].
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn magnitude_histogram(snapshot: &Snapshot) -> Vec<HistogramBin> {
    let width = (HISTOGRAM_MAX - HISTOGRAM_MIN) / HISTOGRAM_BINS as f64;
    let mut bins: Vec<HistogramBin> = (0..HISTOGRAM_BINS)
        .map(|i| HistogramBin {
            x0: HISTOGRAM_MIN + width * i as f64,
            x1: HISTOGRAM_MIN + width * (i + 1) as f64,
            count: 0,
        })
        .collect();

    for mag in snapshot.events().iter().filter_map(|e| e.magnitude) {
        if !(HISTOGRAM_MIN..=HISTOGRAM_MAX).contains(&mag) {
            continue;
        }
        let index = (((mag - HISTOGRAM_MIN) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
        bins[index].count += 1;
    }

    bins
}

/// Event counts per depth band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DepthDistribution {
    pub shallow: usize,
    pub intermediate: usize,
    pub deep: usize,
}

#[must_use]
pub fn depth_distribution(snapshot: &Snapshot) -> DepthDistribution {
    let mut dist = DepthDistribution::default();
    for depth in snapshot.events().iter().filter_map(|e| e.depth_km) {
        match classify_depth(depth) {
            DepthBand::Shallow => dist.shallow += 1,
            DepthBand::Intermediate => dist.intermediate += 1,
            DepthBand::Deep => dist.deep += 1,
        }
    }
    dist
}

/// Event counts per magnitude band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MagnitudeDistribution {
    pub minor: usize,
    pub light: usize,
    pub moderate: usize,
    pub strong: usize,
    pub major: usize,
}

impl MagnitudeDistribution {
    #[must_use]
    pub fn total(&self) -> usize {
        self.minor + self.light + self.moderate + self.strong + self.major
    }

    /// Rows ordered from the strongest band down.
    #[must_use]
    pub fn bands(&self) -> Vec<BandCount> {
        [
            (MagnitudeBand::Major, self.major),
            (MagnitudeBand::Strong, self.strong),
            (MagnitudeBand::Moderate, self.moderate),
            (MagnitudeBand::Light, self.light),
            (MagnitudeBand::Minor, self.minor),
        ]
        .into_iter()
        .map(|(band, count)| BandCount { band: band.as_str(), count, color: band.color() })
        .collect()
    }
}

#[must_use]
pub fn magnitude_distribution(snapshot: &Snapshot) -> MagnitudeDistribution {
    let mut dist = MagnitudeDistribution::default();
    for mag in snapshot.events().iter().filter_map(|e| e.magnitude) {
        match classify_magnitude(mag) {
            MagnitudeBand::Minor => dist.minor += 1,
            MagnitudeBand::Light => dist.light += 1,
            MagnitudeBand::Moderate => dist.moderate += 1,
            MagnitudeBand::Strong => dist.strong += 1,
            MagnitudeBand::Major => dist.major += 1,
        }
    }
    dist
}

/// Number of events that happened a given whole number of hours ago.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hours_ago: i64,
    pub count: usize,
}

/// Bucket events by whole hours before `now`.
///
/// Buckets are sorted ascending by `hours_ago` and only the first 24 are
/// kept. With more than 24 distinct buckets this keeps the smallest
/// `hours_ago` values present in the data, which need not be contiguous.
#[must_use]
pub fn hourly_activity(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<HourlyBucket> {
    let now_ms = now.timestamp_millis();
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for event in snapshot.events() {
        let hours_ago = (now_ms - event.time_ms).div_euclid(HOUR_MS);
        *counts.entry(hours_ago).or_default() += 1;
    }

    counts
        .into_iter()
        .take(HOURLY_BUCKETS)
        .map(|(hours_ago, count)| HourlyBucket { hours_ago, count })
        .collect()
}

/// The `n` most recent events, newest first.
///
/// Works on a copy; ties keep their snapshot order.
#[must_use]
pub fn recent_events(snapshot: &Snapshot, n: usize) -> Vec<SeismicEvent> {
    let mut sorted: Vec<&SeismicEvent> = snapshot.events().iter().collect();
    sorted.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
    sorted.into_iter().take(n).cloned().collect()
}

/// A recent-list entry annotated with its display class.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    #[serde(flatten)]
    pub event: SeismicEvent,
    pub band: Option<MagnitudeBand>,
    pub color: &'static str,
}

/// Everything a renderer needs from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub generated_at: DateTime<Utc>,
    pub summary: SummaryStats,
    pub magnitude_histogram: Vec<HistogramBin>,
    pub magnitude_distribution: MagnitudeDistribution,
    pub depth_distribution: DepthDistribution,
    pub magnitude_bands: Vec<BandCount>,
    pub depth_bands: Vec<BandCount>,
    pub hourly_activity: Vec<HourlyBucket>,
    pub recent: Vec<RecentEvent>,
}

impl DashboardView {
    #[must_use]
    pub fn build(snapshot: &Snapshot, now: DateTime<Utc>) -> Self {
        let recent = recent_events(snapshot, RECENT_EVENTS)
            .into_iter()
            .map(|event| RecentEvent {
                band: event.magnitude.map(classify_magnitude),
                color: magnitude_color(event.magnitude),
                event,
            })
            .collect();

        let magnitude_distribution = magnitude_distribution(snapshot);
        let depth_distribution = depth_distribution(snapshot);

        Self {
            generated_at: now,
            summary: summary_stats(snapshot, now),
            magnitude_histogram: magnitude_histogram(snapshot),
            magnitude_bands: magnitude_distribution.bands(),
            depth_bands: depth_distribution.bands(),
            magnitude_distribution,
            depth_distribution,
            hourly_activity: hourly_activity(snapshot, now),
            recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn event(id: &str, mag: Option<f64>, depth: Option<f64>, time_ms: i64) -> SeismicEvent {
        SeismicEvent {
            id: id.to_string(),
            magnitude: mag,
            depth_km: depth,
            latitude: 0.0,
            longitude: 0.0,
            place: format!("place {id}"),
            time_ms,
            felt_reports: 0,
        }
    }

    fn with_magnitudes(mags: &[Option<f64>]) -> Snapshot {
        let now_ms = now().timestamp_millis();
        Snapshot::new(
            mags.iter()
                .enumerate()
                .map(|(i, m)| event(&format!("e{i}"), *m, Some(10.0), now_ms))
                .collect(),
        )
    }

    #[test]
    fn test_classify_magnitude_boundaries() {
        assert_eq!(classify_magnitude(7.0), MagnitudeBand::Major);
        assert_eq!(classify_magnitude(6.999), MagnitudeBand::Strong);
        assert_eq!(classify_magnitude(6.0), MagnitudeBand::Strong);
        assert_eq!(classify_magnitude(5.0), MagnitudeBand::Moderate);
        assert_eq!(classify_magnitude(4.0), MagnitudeBand::Light);
        assert_eq!(classify_magnitude(3.999), MagnitudeBand::Minor);
        assert_eq!(classify_magnitude(-1.0), MagnitudeBand::Minor);
    }

    #[test]
    fn test_classify_depth_boundaries() {
        assert_eq!(classify_depth(0.0), DepthBand::Shallow);
        assert_eq!(classify_depth(69.9), DepthBand::Shallow);
        assert_eq!(classify_depth(70.0), DepthBand::Intermediate);
        assert_eq!(classify_depth(299.9), DepthBand::Intermediate);
        assert_eq!(classify_depth(300.0), DepthBand::Deep);
        assert_eq!(classify_depth(-1.5), DepthBand::Shallow);
    }

    #[test]
    fn test_magnitude_color() {
        assert_eq!(magnitude_color(None), UNKNOWN_COLOR);
        assert_eq!(magnitude_color(Some(7.2)), MagnitudeBand::Major.color());
        assert_eq!(magnitude_color(Some(2.0)), MagnitudeBand::Minor.color());
    }

    #[test]
    fn test_depth_color() {
        assert_eq!(DepthBand::Shallow.color(), "#f97316");
        assert_eq!(DepthBand::Intermediate.color(), "#3b82f6");
        assert_eq!(DepthBand::Deep.color(), "#7c3aed");
        assert_eq!(classify_depth(450.0).color(), DepthBand::Deep.color());
    }

    #[test]
    fn test_magnitude_distribution_scenario() {
        let snapshot = with_magnitudes(&[Some(3.2), Some(4.5), Some(6.9), Some(7.1), None]);
        let dist = magnitude_distribution(&snapshot);
        assert_eq!(
            dist,
            MagnitudeDistribution {
                minor: 1,
                light: 1,
                moderate: 0,
                strong: 1,
                major: 1,
            }
        );
        assert_eq!(dist.total(), 4);

        let stats = summary_stats(&snapshot, now());
        assert_eq!(stats.total, 5);
        assert!((stats.largest_magnitude - 7.1).abs() < 1e-9);
        assert!((stats.average_magnitude - 5.425).abs() < 1e-9);
    }

    #[test]
    fn test_depth_distribution_scenario() {
        let snapshot = Snapshot::new(
            [Some(10.0), Some(70.0), Some(299.0), Some(300.0), None]
                .into_iter()
                .enumerate()
                .map(|(i, d)| event(&format!("d{i}"), Some(3.0), d, 0))
                .collect(),
        );
        assert_eq!(
            depth_distribution(&snapshot),
            DepthDistribution {
                shallow: 1,
                intermediate: 2,
                deep: 1,
            }
        );
    }

    #[test]
    fn test_summary_stats_empty() {
        assert_eq!(summary_stats(&Snapshot::empty(), now()), SummaryStats::default());
        assert_eq!(
            summary_stats(&with_magnitudes(&[None, None]), now()),
            SummaryStats {
                total: 2,
                largest_magnitude: 0.0,
                average_magnitude: 0.0,
                count_last_24h: 2,
            }
        );
    }

    #[test]
    fn test_count_last_24h_is_strict() {
        let now_ms = now().timestamp_millis();
        let snapshot = Snapshot::new(vec![
            event("a", Some(1.0), None, now_ms - 1),
            event("b", Some(1.0), None, now_ms - DAY_MS + 1),
            event("c", Some(1.0), None, now_ms - DAY_MS),
            event("d", Some(1.0), None, now_ms - 2 * DAY_MS),
        ]);
        assert_eq!(summary_stats(&snapshot, now()).count_last_24h, 2);
    }

    #[test]
    fn test_histogram_bins() {
        let snapshot = with_magnitudes(&[
            Some(0.0),
            Some(0.49),
            Some(0.5),
            Some(4.75),
            Some(9.99),
            Some(10.0),
            Some(10.5),
            Some(-0.3),
            None,
        ]);
        let bins = magnitude_histogram(&snapshot);
        assert_eq!(bins.len(), HISTOGRAM_BINS);
        assert!((bins[0].x0 - 0.0).abs() < 1e-9);
        assert!((bins[0].x1 - 0.5).abs() < 1e-9);
        assert!((bins[19].x1 - 10.0).abs() < 1e-9);

        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[9].count, 1);
        assert_eq!(bins[19].count, 2);

        // 6 of the 9 magnitudes lie in [0, 10]
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 6);
    }

    #[test]
    fn test_histogram_empty() {
        let bins = magnitude_histogram(&Snapshot::empty());
        assert_eq!(bins.len(), HISTOGRAM_BINS);
        assert!(bins.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_hourly_activity() {
        let now_ms = now().timestamp_millis();
        let snapshot = Snapshot::new(vec![
            event("a", Some(1.0), None, now_ms - 10),
            event("b", Some(1.0), None, now_ms - HOUR_MS + 1),
            event("c", Some(1.0), None, now_ms - HOUR_MS),
            event("d", Some(1.0), None, now_ms - 5 * HOUR_MS - 7),
            event("e", Some(1.0), None, now_ms - 5 * HOUR_MS - 9),
        ]);
        assert_eq!(
            hourly_activity(&snapshot, now()),
            vec![
                HourlyBucket { hours_ago: 0, count: 2 },
                HourlyBucket { hours_ago: 1, count: 1 },
                HourlyBucket { hours_ago: 5, count: 2 },
            ]
        );
        assert!(hourly_activity(&Snapshot::empty(), now()).is_empty());
    }

    #[test]
    fn test_hourly_activity_keeps_first_24_after_sort() {
        let now_ms = now().timestamp_millis();
        // 30 distinct buckets, inserted newest-last
        let snapshot = Snapshot::new(
            (0..30)
                .rev()
                .map(|h| event(&format!("h{h}"), None, None, now_ms - h * HOUR_MS))
                .collect(),
        );
        let buckets = hourly_activity(&snapshot, now());
        assert_eq!(buckets.len(), HOURLY_BUCKETS);
        assert_eq!(buckets.first().map(|b| b.hours_ago), Some(0));
        assert_eq!(buckets.last().map(|b| b.hours_ago), Some(23));
    }

    #[test]
    fn test_recent_events_does_not_mutate() {
        let snapshot = Snapshot::new(vec![
            event("old", Some(1.0), None, 100),
            event("new", Some(1.0), None, 300),
            event("tie-a", Some(1.0), None, 200),
            event("tie-b", Some(1.0), None, 200),
        ]);
        let before: Vec<String> = snapshot.events().iter().map(|e| e.id.clone()).collect();

        let first = recent_events(&snapshot, 3);
        let second = recent_events(&snapshot, 3);
        assert_eq!(first, second);

        let ids: Vec<&str> = first.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["new", "tie-a", "tie-b"]);

        let after: Vec<String> = snapshot.events().iter().map(|e| e.id.clone()).collect();
        assert_eq!(before, after);

        assert_eq!(recent_events(&snapshot, 10).len(), 4);
        assert!(recent_events(&Snapshot::empty(), 10).is_empty());
    }

    #[test]
    fn test_dashboard_view() {
        let snapshot = with_magnitudes(&[Some(5.5), None]);
        let view = DashboardView::build(&snapshot, now());
        assert_eq!(view.summary.total, 2);
        assert_eq!(view.recent.len(), 2);
        assert_eq!(view.magnitude_distribution.moderate, 1);
        assert!(view.recent.iter().any(|r| r.band.is_none() && r.color == UNKNOWN_COLOR));

        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["recent"][0]["id"], "e0");
        assert_eq!(json["magnitude_bands"][0]["band"], "major");
        assert_eq!(json["magnitude_bands"][2]["count"], 1);
        assert_eq!(json["magnitude_bands"][2]["color"], MagnitudeBand::Moderate.color());
        assert_eq!(json["depth_bands"][0]["band"], "shallow");
        assert_eq!(json["depth_bands"][0]["color"], DepthBand::Shallow.color());
    }
}
