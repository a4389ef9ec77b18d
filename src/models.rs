//! Data models for the USGS event feed and the in-memory snapshot.
//!
//! The wire structures mirror the GeoJSON emitted by the FDSN event service.
//! They are deliberately lenient: every property the dashboard does not
//! strictly need is optional, and missing collections default to empty.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{MagnitudeBand, classify_magnitude};
use crate::errors::SeismodashError;

/// Top-level GeoJSON response from the event query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    /// Normally "FeatureCollection"
    #[serde(rename = "type", default)]
    pub type_: Option<String>,

    /// Feed metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Earthquake events; absent or null means none
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Validate the response structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the document declares a type other than
    /// `FeatureCollection`.
    pub fn validate(&self) -> Result<(), SeismodashError> {
        match self.type_.as_deref() {
            None | Some("FeatureCollection") => Ok(()),
            Some(other) => Err(SeismodashError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{other}'"
            ))),
        }
    }

    /// Normalize the features into snapshot events.
    ///
    /// Features without an id are skipped. Ids are unique within a snapshot,
    /// so repeated ids keep their first occurrence.
    #[must_use]
    pub fn into_events(self) -> Vec<SeismicEvent> {
        let mut seen = HashSet::with_capacity(self.features.len());
        let mut events = Vec::with_capacity(self.features.len());

        for feature in self.features {
            if let Err(e) = feature.validate() {
                warn!("skipping feature: {e}");
                continue;
            }
            if !seen.insert(feature.id.clone()) {
                debug!("dropping duplicate event id {}", feature.id);
                continue;
            }
            events.push(SeismicEvent::from(&feature));
        }

        events
    }
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    /// Number of events in response
    #[serde(default)]
    pub count: Option<usize>,
}

/// A single earthquake record as delivered by the feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    /// Unique event ID
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Geographic location
    #[serde(default)]
    pub geometry: Option<Geometry>,

    /// Event properties
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Properties,
}

impl Feature {
    /// Validate the event structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the event has no id or no origin time.
    pub fn validate(&self) -> Result<(), SeismodashError> {
        if self.id.is_empty() {
            return Err(SeismodashError::InvalidResponse("empty event ID".into()));
        }
        if self.properties.time.is_none() {
            return Err(SeismodashError::InvalidResponse(format!(
                "event {} has no time",
                self.id
            )));
        }
        Ok(())
    }

    fn coordinate(&self, index: usize) -> Option<f64> {
        self.geometry
            .as_ref()
            .and_then(|g| g.coordinates.get(index).copied().flatten())
    }

    /// Get longitude (degrees).
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.coordinate(0).unwrap_or(0.0)
    }

    /// Get latitude (degrees).
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.coordinate(1).unwrap_or(0.0)
    }

    /// Get depth in kilometers (positive down), if reported.
    #[must_use]
    pub fn depth_km(&self) -> Option<f64> {
        self.coordinate(2)
    }
}

/// Geographic geometry for an event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    /// Coordinates: [longitude, latitude, depth_km]; depth may be null
    #[serde(default, deserialize_with = "null_as_default")]
    pub coordinates: Vec<Option<f64>>,
}

/// Event properties consumed by the dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Properties {
    /// Magnitude value
    pub mag: Option<f64>,

    /// Human-readable place description
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: Option<i64>,

    /// Number of "Did You Feel It?" reports
    pub felt: Option<i64>,

    /// Alert level: null, "green", "yellow", "orange", "red"
    pub alert: Option<String>,

    /// Tsunami flag: 0 or 1
    pub tsunami: Option<i64>,

    /// Significance score (0-1000+)
    pub sig: Option<i64>,

    /// Modified Mercalli Intensity
    pub mmi: Option<f64>,

    /// Community Decimal Intensity
    pub cdi: Option<f64>,

    /// Event page URL
    pub url: Option<String>,
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One event in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeismicEvent {
    pub id: String,
    pub magnitude: Option<f64>,
    pub depth_km: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    pub place: String,
    pub time_ms: i64,
    pub felt_reports: u64,
}

impl SeismicEvent {
    /// Get the event time as a `DateTime<Utc>`.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time_ms).single()
    }
}

impl From<&Feature> for SeismicEvent {
    fn from(f: &Feature) -> Self {
        Self {
            id: f.id.clone(),
            magnitude: f.properties.mag,
            depth_km: f.depth_km(),
            latitude: f.latitude(),
            longitude: f.longitude(),
            place: f.properties.place.clone().unwrap_or_default(),
            time_ms: f.properties.time.unwrap_or_default(),
            felt_reports: f
                .properties
                .felt
                .map_or(0, |n| u64::try_from(n).unwrap_or(0)),
        }
    }
}

/// Extended event fields, available only from the per-event detail lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: SeismicEvent,
    pub alert_level: Option<String>,
    pub is_tsunami: bool,
    pub significance: i64,
    pub max_mmi: Option<f64>,
    pub cdi: Option<f64>,
    pub detail_url: Option<String>,
}

impl From<&Feature> for EventDetail {
    fn from(f: &Feature) -> Self {
        Self {
            event: SeismicEvent::from(f),
            alert_level: f.properties.alert.clone(),
            is_tsunami: f.properties.tsunami.is_some_and(|t| t != 0),
            significance: f.properties.sig.unwrap_or(0),
            max_mmi: f.properties.mmi,
            cdi: f.properties.cdi,
            detail_url: f.properties.url.clone(),
        }
    }
}

/// The immutable set of events currently held by the dashboard.
///
/// Cloning is cheap and shares storage. There is no way to mutate the
/// events once the snapshot exists; a refresh builds a new one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    events: Arc<[SeismicEvent]>,
}

impl Snapshot {
    #[must_use]
    pub fn new(events: Vec<SeismicEvent>) -> Self {
        Self {
            events: Arc::from(events),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn events(&self) -> &[SeismicEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Simplified event for output.
///
/// This is the normalized structure we emit in JSON/NDJSON output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    pub id: String,
    pub time: String,
    pub magnitude: Option<f64>,
    pub band: Option<MagnitudeBand>,
    pub depth_km: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    pub place: String,
    pub felt_reports: u64,
}

impl From<&SeismicEvent> for OutputEvent {
    fn from(e: &SeismicEvent) -> Self {
        Self {
            id: e.id.clone(),
            time: e
                .time()
                .map_or_else(|| "unknown".into(), |t| t.to_rfc3339()),
            magnitude: e.magnitude,
            band: e.magnitude.map(classify_magnitude),
            depth_km: e.depth_km,
            latitude: e.latitude,
            longitude: e.longitude,
            place: e.place.clone(),
            felt_reports: e.felt_reports,
        }
    }
}
