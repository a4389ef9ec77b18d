//! USGS FDSN event service client.
//!
//! Executes queries built by [`crate::query::build_query`] and the
//! per-event detail lookup. Uses async reqwest with rustls for TLS.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, instrument};

use crate::errors::SeismodashError;
use crate::models::{EventDetail, Feature, FeatureCollection, SeismicEvent};
use crate::query::{FEED_QUERY_PATH, QuerySpec};
use crate::refresh::EventSource;

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("seismodash/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for the event service.
pub const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Client for the USGS event service.
#[derive(Debug, Clone)]
pub struct UsgsClient {
    client: Client,
    base_url: String,
}

impl UsgsClient {
    /// Create a client against a feed host, normally [`USGS_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_base_url(base_url: &str) -> Result<Self, SeismodashError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the events matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or an
    /// unparseable response.
    #[instrument(skip(self, query), fields(limit = query.get("limit")))]
    pub async fn query_events(&self, query: &QuerySpec) -> Result<Vec<SeismicEvent>, SeismodashError> {
        let url = query.to_url(&self.base_url)?;
        debug!("fetching events from {}", url);

        let response = check_status(self.client.get(url).send().await?).await?;
        let body = response.text().await?;
        let feed: FeatureCollection = serde_json::from_str(&body)?;
        feed.validate()?;

        let reported = feed.metadata.as_ref().and_then(|m| m.count);
        let events = feed.into_events();
        debug!(?reported, "fetched {} events", events.len());
        Ok(events)
    }

    /// Fetch the extended properties of a single event.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`SeismodashError::DetailUnavailable`].
    #[instrument(skip(self))]
    pub async fn fetch_detail(&self, id: &str) -> Result<EventDetail, SeismodashError> {
        self.fetch_detail_inner(id)
            .await
            .map_err(|e| e.into_detail_failure(id))
    }

    async fn fetch_detail_inner(&self, id: &str) -> Result<EventDetail, SeismodashError> {
        let url = format!("{}{FEED_QUERY_PATH}", self.base_url);
        debug!("fetching detail for {} from {}", id, url);

        let response = self
            .client
            .get(&url)
            .query(&[("eventid", id), ("format", "geojson")])
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        let feature: Feature = serde_json::from_str(&body)?;
        feature.validate()?;

        Ok(EventDetail::from(&feature))
    }
}

/// Turn a non-success status into an API error carrying the response body.
async fn check_status(response: Response) -> Result<Response, SeismodashError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SeismodashError::Api {
        status: status.as_u16(),
        message,
    })
}

impl EventSource for UsgsClient {
    async fn fetch_events(&self, query: &QuerySpec) -> Result<Vec<SeismicEvent>, SeismodashError> {
        self.query_events(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterConfig, build_query};
    use axum::{Router, http::StatusCode, routing::get};
    use chrono::Utc;

    const DETAIL: &str = r#"{
        "type": "Feature",
        "id": "us7000abcd",
        "geometry": { "type": "Point", "coordinates": [142.37, 38.29, 29.0] },
        "properties": {
            "mag": 6.1, "place": "80 km E of Ofunato, Japan", "time": 1699999000000,
            "felt": 40, "alert": "yellow", "tsunami": 1, "sig": 650, "mmi": 6.2, "cdi": 5.1,
            "url": "https://earthquake.usgs.gov/earthquakes/eventpage/us7000abcd"
        }
    }"#;

    /// Answer every request on the query path with a fixed status and body.
    async fn stub_feed(status: StatusCode, body: &'static str) -> UsgsClient {
        let app = Router::new().route(FEED_QUERY_PATH, get(move || async move { (status, body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        UsgsClient::with_base_url(&format!("http://{addr}")).unwrap()
    }

    fn default_query() -> QuerySpec {
        build_query(&FilterConfig::default(), Utc::now())
    }

    #[test]
    fn test_base_url_normalized() {
        let client = UsgsClient::with_base_url("http://localhost:9000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000");
        let client = UsgsClient::with_base_url(USGS_BASE_URL).unwrap();
        assert_eq!(client.base_url(), USGS_BASE_URL);
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_http_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = UsgsClient::with_base_url("http://127.0.0.1:9").unwrap();
        let err = client.query_events(&default_query()).await.unwrap_err();
        assert!(matches!(err, SeismodashError::Http(_)));

        let err = client.fetch_detail("us7000abcd").await.unwrap_err();
        assert!(matches!(err, SeismodashError::DetailUnavailable { ref id, .. } if id == "us7000abcd"));
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let client = stub_feed(StatusCode::SERVICE_UNAVAILABLE, "Error 503: service unavailable").await;

        let err = client.fetch_events(&default_query()).await.unwrap_err();
        assert!(matches!(
            err,
            SeismodashError::Api { status: 503, ref message } if message.contains("service unavailable")
        ));

        let err = client.fetch_detail("us7000abcd").await.unwrap_err();
        assert!(matches!(err, SeismodashError::DetailUnavailable { ref reason, .. } if reason.contains("503")));
    }

    #[tokio::test]
    async fn test_missing_features_is_empty() {
        let client = stub_feed(StatusCode::OK, r#"{"type":"FeatureCollection"}"#).await;
        let events = client.fetch_events(&default_query()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_document_type_rejected() {
        let client = stub_feed(StatusCode::OK, r#"{"type":"Feature","features":[]}"#).await;
        let err = client.query_events(&default_query()).await.unwrap_err();
        assert!(matches!(err, SeismodashError::InvalidResponse(_)));

        let client = stub_feed(StatusCode::OK, "<html>maintenance</html>").await;
        let err = client.query_events(&default_query()).await.unwrap_err();
        assert!(matches!(err, SeismodashError::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_detail_parses_feature() {
        let client = stub_feed(StatusCode::OK, DETAIL).await;
        let detail = client.fetch_detail("us7000abcd").await.unwrap();
        assert_eq!(detail.event.id, "us7000abcd");
        assert_eq!(detail.event.magnitude, Some(6.1));
        assert_eq!(detail.event.depth_km, Some(29.0));
        assert_eq!(detail.event.felt_reports, 40);
        assert_eq!(detail.alert_level.as_deref(), Some("yellow"));
        assert!(detail.is_tsunami);
        assert_eq!(detail.significance, 650);
        assert_eq!(detail.max_mmi, Some(6.2));
        assert!(detail.detail_url.is_some_and(|u| u.ends_with("us7000abcd")));
    }
}
