use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// One active incident report as fetched from the reports service.
///
/// Read-only inside the core; a refetch replaces the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub coordinate: Coordinate,
    pub categories: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub media_refs: Vec<String>,
}

/// Wire shape of a report record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    categories: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    media_urls: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed incident list: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("network disabled")]
    NetworkDisabled,
}

/// Decodes a JSON array of report records.
///
/// Only a body that is not a record array at all is an error; bad records
/// inside it are dropped by [`incidents_from_records`].
pub fn parse_incident_records(body: &[u8]) -> Result<Vec<Incident>, FetchError> {
    let records: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    Ok(incidents_from_records(records))
}

/// Converts already-decoded report records.
///
/// A record that does not match the wire shape, has out-of-range coordinates
/// or a blank id is skipped with a warning; a duplicate id keeps the first
/// occurrence.
pub fn incidents_from_records(records: Vec<serde_json::Value>) -> Vec<Incident> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for (index, value) in records.into_iter().enumerate() {
        let record: IncidentRecord = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(index, %e, "skipping malformed incident record");
                continue;
            }
        };
        let id = record.id.trim().to_string();
        if id.is_empty() {
            tracing::warn!("skipping incident record with blank id");
            continue;
        }
        let coordinate = match Coordinate::new(record.latitude, record.longitude) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(incident_id = %id, %e, "skipping incident with invalid coordinate");
                continue;
            }
        };
        if !seen.insert(id.clone()) {
            tracing::warn!(incident_id = %id, "duplicate incident id; keeping first");
            continue;
        }
        out.push(Incident {
            id,
            title: record.title,
            description: record.description,
            coordinate,
            categories: record
                .categories
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            created_at: record.created_at,
            media_refs: record.media_urls,
        });
    }
    out
}
