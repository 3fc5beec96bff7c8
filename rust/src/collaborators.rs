//! Seams to the systems around the core: the reports service, location
//! lookup, the map surface and the room transport.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::core::config::AppConfig;
use crate::geo::Coordinate;
use crate::incident::{incidents_from_records, FetchError, Incident};
use crate::markers::{HeadlessMap, MapProvider};
use crate::RoomTransport;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub trait IncidentSource: Send + Sync + 'static {
    fn fetch_active_incidents(&self) -> BoxFuture<'static, Result<Vec<Incident>, FetchError>>;
}

/// `None` covers denial, lookup failure and "unknown" alike.
pub trait LocationResolver: Send + Sync + 'static {
    fn resolve_user_location(&self) -> BoxFuture<'static, Option<Coordinate>>;
}

/// Fixed incident list, e.g. loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticIncidents(pub Vec<Incident>);

impl IncidentSource for StaticIncidents {
    fn fetch_active_incidents(&self) -> BoxFuture<'static, Result<Vec<Incident>, FetchError>> {
        let incidents = self.0.clone();
        Box::pin(async move { Ok(incidents) })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(pub Option<Coordinate>);

impl LocationResolver for FixedLocation {
    fn resolve_user_location(&self) -> BoxFuture<'static, Option<Coordinate>> {
        let coordinate = self.0;
        Box::pin(async move { coordinate })
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `GET <url>` returning a JSON array of report records.
#[derive(Debug, Clone)]
pub struct HttpIncidentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpIncidentSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            url: url.into(),
        }
    }
}

impl IncidentSource for HttpIncidentSource {
    fn fetch_active_incidents(&self) -> BoxFuture<'static, Result<Vec<Incident>, FetchError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let records: Vec<serde_json::Value> = resp.json().await.map_err(|e| {
                if e.is_decode() {
                    FetchError::Http(format!("malformed incident list: {e}"))
                } else {
                    FetchError::Http(e.to_string())
                }
            })?;
            Ok(incidents_from_records(records))
        })
    }
}

/// Stands in for a configured reports service while the network is off.
#[derive(Debug, Clone, Copy)]
struct NetworkDisabledSource;

impl IncidentSource for NetworkDisabledSource {
    fn fetch_active_incidents(&self) -> BoxFuture<'static, Result<Vec<Incident>, FetchError>> {
        Box::pin(async { Err(FetchError::NetworkDisabled) })
    }
}

#[derive(Debug, Deserialize)]
struct LocationResponse {
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lon", alias = "lng")]
    longitude: Option<f64>,
}

/// Reads a coordinate out of an IP geolocation response. Accepts both
/// `latitude`/`longitude` and `lat`/`lon` shapes.
pub fn parse_location_response(body: &[u8]) -> Option<Coordinate> {
    let parsed: LocationResponse = serde_json::from_slice(body).ok()?;
    Coordinate::new(parsed.latitude?, parsed.longitude?).ok()
}

/// IP-based fallback location.
#[derive(Debug, Clone)]
pub struct IpLocationResolver {
    client: reqwest::Client,
    url: String,
}

impl IpLocationResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            url: url.into(),
        }
    }
}

impl LocationResolver for IpLocationResolver {
    fn resolve_user_location(&self) -> BoxFuture<'static, Option<Coordinate>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let resp = match client.get(&url).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::warn!(status = %r.status(), "location lookup rejected");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(%e, "location lookup failed");
                    return None;
                }
            };
            let body = resp.bytes().await.ok()?;
            let coordinate = parse_location_response(&body);
            if coordinate.is_none() {
                tracing::warn!("location lookup returned no usable coordinate");
            }
            coordinate
        })
    }
}

/// Everything the app actor needs from the outside.
pub struct Collaborators {
    pub incidents: Arc<dyn IncidentSource>,
    pub location: Arc<dyn LocationResolver>,
    pub transport: Arc<dyn RoomTransport>,
    pub map: Box<dyn MapProvider>,
}

impl Collaborators {
    pub fn new(
        incidents: Arc<dyn IncidentSource>,
        location: Arc<dyn LocationResolver>,
        transport: Arc<dyn RoomTransport>,
    ) -> Self {
        Self {
            incidents,
            location,
            transport,
            map: Box::new(HeadlessMap::default()),
        }
    }

    pub fn with_map(mut self, map: Box<dyn MapProvider>) -> Self {
        self.map = map;
        self
    }

    /// HTTP collaborators for whatever URLs the config names; anything
    /// unconfigured resolves to empty. With the network disabled a configured
    /// reports service fails every fetch with `NetworkDisabled`.
    pub fn from_config(config: &AppConfig, transport: Arc<dyn RoomTransport>) -> Self {
        let network = config.network_enabled();
        let incidents: Arc<dyn IncidentSource> = match config.incidents_url() {
            Some(url) if network => Arc::new(HttpIncidentSource::new(url)),
            Some(_) => Arc::new(NetworkDisabledSource),
            None => Arc::new(StaticIncidents::default()),
        };
        let location: Arc<dyn LocationResolver> = match config.location_url() {
            Some(url) if network => Arc::new(IpLocationResolver::new(url)),
            _ => Arc::new(FixedLocation(None)),
        };
        Self::new(incidents, location, transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_location_shapes() {
        let a = parse_location_response(br#"{"ip":"1.2.3.4","latitude":20.0,"longitude":78.0}"#);
        assert_eq!(a, Some(Coordinate::new(20.0, 78.0).unwrap()));

        let b = parse_location_response(br#"{"status":"success","lat":-33.87,"lon":151.21}"#);
        assert_eq!(b, Some(Coordinate::new(-33.87, 151.21).unwrap()));
    }

    #[test]
    fn unusable_location_responses_are_absent() {
        assert_eq!(parse_location_response(b"not json"), None);
        assert_eq!(parse_location_response(br#"{"latitude":20.0}"#), None);
        assert_eq!(
            parse_location_response(br#"{"latitude":95.0,"longitude":0.0}"#),
            None
        );
    }

    #[tokio::test]
    async fn disabled_network_never_builds_http_sources() {
        let config = AppConfig {
            disable_network: Some(true),
            incidents_url: Some("http://127.0.0.1:9/reports".into()),
            location_url: Some("http://127.0.0.1:9/where".into()),
            ..AppConfig::default()
        };
        let transport: Arc<dyn RoomTransport> = Arc::new(crate::InMemoryRoomRelay::new());
        let collaborators = Collaborators::from_config(&config, transport);
        let incidents = collaborators.incidents.fetch_active_incidents().await;
        assert!(matches!(incidents, Err(FetchError::NetworkDisabled)));
        assert_eq!(collaborators.location.resolve_user_location().await, None);
    }

    /// Answers a single request with `status` and `body`.
    async fn serve_once(status: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}/reports/active")
    }

    #[tokio::test]
    async fn http_source_skips_malformed_records() {
        let body = serde_json::json!([
            { "id": "no-time", "latitude": 1.0, "longitude": 1.0 },
            {
                "id": "quake-7",
                "title": "Aftershock",
                "latitude": 35.0,
                "longitude": 139.0,
                "categories": ["earthquake"],
                "createdAt": "2025-04-15T04:00:00Z"
            }
        ]);
        let url = serve_once("200 OK", body.to_string()).await;
        let incidents = HttpIncidentSource::new(url)
            .fetch_active_incidents()
            .await
            .unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].id, "quake-7");
    }

    #[tokio::test]
    async fn http_source_reports_status_and_bad_bodies() {
        let url = serve_once("503 Service Unavailable", String::new()).await;
        let err = HttpIncidentSource::new(url)
            .fetch_active_incidents()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(503)));

        let url = serve_once("200 OK", r#"{"error":"Failed"}"#.to_string()).await;
        let err = HttpIncidentSource::new(url)
            .fetch_active_incidents()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(msg) if msg.starts_with("malformed incident list")));
    }

    #[tokio::test]
    async fn unconfigured_sources_are_empty() {
        let config = AppConfig {
            disable_network: Some(true),
            ..AppConfig::default()
        };
        let transport: Arc<dyn RoomTransport> = Arc::new(crate::InMemoryRoomRelay::new());
        let collaborators = Collaborators::from_config(&config, transport);
        let incidents = collaborators.incidents.fetch_active_incidents().await;
        assert!(incidents.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_collaborators_resolve_immediately() {
        let source = StaticIncidents::default();
        assert!(source.fetch_active_incidents().await.unwrap().is_empty());
        let here = Coordinate::new(1.0, 2.0).unwrap();
        assert_eq!(FixedLocation(Some(here)).resolve_user_location().await, Some(here));
    }
}
