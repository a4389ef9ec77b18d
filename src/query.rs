//! Filter configuration and query construction for the FDSN event service.
//!
//! `build_query` is a pure function: it never touches the network and never
//! fails. Validation of user input happens at the surfaces (CLI, config API)
//! through [`FilterConfig::validate`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::errors::SeismodashError;

/// Path of the event query endpoint, relative to the feed base URL.
pub const FEED_QUERY_PATH: &str = "/fdsnws/event/1/query";

/// Output format requested from the feed.
const FEED_FORMAT: &str = "geojson";

/// Look-back window for a query.
///
/// Unrecognized names fall back to [`TimeRange::Day`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TimeRange {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeRange {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Length of the window ending at "now".
    #[must_use]
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::hours(24),
            Self::Week => TimeDelta::days(7),
            Self::Month => TimeDelta::days(30),
        }
    }

    /// Parse a range name, defaulting to a day for anything unknown.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "hour" => Self::Hour,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::Day,
        }
    }
}

impl From<String> for TimeRange {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum number of events requested per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ResultLimit {
    Top50,
    #[default]
    Top100,
    Top250,
    Top500,
}

impl ResultLimit {
    #[must_use]
    pub const fn get(self) -> u32 {
        match self {
            Self::Top50 => 50,
            Self::Top100 => 100,
            Self::Top250 => 250,
            Self::Top500 => 500,
        }
    }
}

impl TryFrom<u32> for ResultLimit {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            50 => Ok(Self::Top50),
            100 => Ok(Self::Top100),
            250 => Ok(Self::Top250),
            500 => Ok(Self::Top500),
            _ => Err(format!("unsupported limit {n} (expected: 50, 100, 250, 500)")),
        }
    }
}

impl From<ResultLimit> for u32 {
    fn from(limit: ResultLimit) -> Self {
        limit.get()
    }
}

impl std::str::FromStr for ResultLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid limit '{s}': {e}"))?;
        Self::try_from(n)
    }
}

/// Circular search area: centre point plus radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRadius {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
}

impl std::str::FromStr for GeoRadius {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return Err(format!(
                "radius requires 3 values (lat,lon,radius_km), got {}",
                parts.len()
            ));
        }

        let vals: Result<Vec<f64>, _> = parts.iter().map(|p| p.trim().parse::<f64>()).collect();
        let vals = vals.map_err(|e| format!("invalid number in radius: {e}"))?;

        let radius = Self {
            center_lat: vals[0],
            center_lon: vals[1],
            radius_km: vals[2],
        };

        if !(-90.0..=90.0).contains(&radius.center_lat) {
            return Err(format!(
                "latitude {} out of range [-90, 90]",
                radius.center_lat
            ));
        }
        if !(-180.0..=180.0).contains(&radius.center_lon) {
            return Err(format!(
                "longitude {} out of range [-180, 180]",
                radius.center_lon
            ));
        }
        if radius.radius_km <= 0.0 {
            return Err(format!("radius must be positive, got {}", radius.radius_km));
        }

        Ok(radius)
    }
}

/// User-controlled parameters determining which events to request.
///
/// Every optional bound is an explicit `Option`: a bound of zero is present
/// and is sent to the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub time_range: TimeRange,
    pub min_magnitude: Option<f64>,
    pub max_magnitude: Option<f64>,
    pub limit: ResultLimit,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            time_range: TimeRange::Day,
            min_magnitude: Some(2.5),
            max_magnitude: None,
            limit: ResultLimit::Top100,
            latitude: None,
            longitude: None,
            radius_km: None,
            min_depth: None,
            max_depth: None,
        }
    }
}

impl FilterConfig {
    /// Restrict the query to a circular area.
    #[must_use]
    pub fn with_radius(mut self, radius: GeoRadius) -> Self {
        self.latitude = Some(radius.center_lat);
        self.longitude = Some(radius.center_lon);
        self.radius_km = Some(radius.radius_km);
        self
    }

    /// Check that every present bound is within its domain.
    ///
    /// # Errors
    ///
    /// Returns [`SeismodashError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), SeismodashError> {
        let invalid = |msg: String| Err(SeismodashError::InvalidConfig(msg));

        for (name, value) in [
            ("min_magnitude", self.min_magnitude),
            ("max_magnitude", self.max_magnitude),
        ] {
            if let Some(m) = value {
                if !(0.0..=10.0).contains(&m) {
                    return invalid(format!("{name} {m} out of range [0, 10]"));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_magnitude, self.max_magnitude) {
            if min > max {
                return invalid(format!("min_magnitude {min} must be <= max_magnitude {max}"));
            }
        }
        match (self.latitude, self.longitude, self.radius_km) {
            (None, None, None) | (Some(_), Some(_), Some(_)) => {}
            _ => {
                return invalid(
                    "latitude, longitude and radius_km must be given together".to_string(),
                );
            }
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return invalid(format!("latitude {lat} out of range [-90, 90]"));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return invalid(format!("longitude {lon} out of range [-180, 180]"));
            }
        }
        if let Some(r) = self.radius_km {
            if r <= 0.0 {
                return invalid(format!("radius must be positive, got {r}"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_depth, self.max_depth) {
            if min > max {
                return invalid(format!("min_depth {min} must be <= max_depth {max}"));
            }
        }
        Ok(())
    }
}

/// A fully-qualified request for the event query endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    params: Vec<(&'static str, String)>,
}

impl QuerySpec {
    /// Query parameters in emission order.
    #[must_use]
    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }

    /// Look up a single parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the query as a URL against the given feed base.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not a valid URL.
    pub fn to_url(&self, base: &str) -> Result<Url, SeismodashError> {
        let endpoint = format!("{}{FEED_QUERY_PATH}", base.trim_end_matches('/'));
        Url::parse_with_params(
            &endpoint,
            self.params.iter().map(|(k, v)| (*k, v.as_str())),
        )
        .map_err(|e| SeismodashError::InvalidConfig(format!("invalid base url '{base}': {e}")))
    }
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Translate a filter configuration into a feed query.
///
/// The window ends at `now`. Identical inputs always produce identical
/// queries.
#[must_use]
pub fn build_query(config: &FilterConfig, now: DateTime<Utc>) -> QuerySpec {
    let start = now - config.time_range.duration();

    let mut params: Vec<(&'static str, String)> = vec![
        ("format", FEED_FORMAT.to_string()),
        ("limit", config.limit.get().to_string()),
        ("starttime", format_timestamp(start)),
        ("endtime", format_timestamp(now)),
        ("orderby", "time".to_string()),
    ];

    let optional = [
        ("minmagnitude", config.min_magnitude),
        ("maxmagnitude", config.max_magnitude),
        ("mindepth", config.min_depth),
        ("maxdepth", config.max_depth),
        ("latitude", config.latitude),
        ("longitude", config.longitude),
        ("maxradiuskm", config.radius_km),
    ];
    params.extend(
        optional
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v.to_string()))),
    );

    QuerySpec { params }
}
