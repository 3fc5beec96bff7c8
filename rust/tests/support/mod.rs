#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use beacon_core::{
    AppReconciler, AppUpdate, BeaconApp, ChatMessage, Collaborators, Coordinate, FixedLocation,
    InMemoryRoomRelay, Incident, MapError, MapProvider, MarkerHandle, MarkerState,
    StaticIncidents,
};
use chrono::Utc;
use tempfile::TempDir;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn coord(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude).unwrap()
}

pub fn incident(id: &str, latitude: f64, longitude: f64, categories: &[&str]) -> Incident {
    Incident {
        id: id.to_string(),
        title: format!("Incident {id}"),
        description: String::new(),
        coordinate: coord(latitude, longitude),
        categories: categories.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        created_at: Utc::now(),
        media_refs: Vec::new(),
    }
}

pub fn message(id: &str, author_key: &str, name: &str, text: &str, ts: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        author_key: author_key.to_string(),
        display_name: name.to_string(),
        text: text.to_string(),
        timestamp: Some(ts),
    }
}

#[derive(Clone, Default)]
pub struct Collector {
    pub updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl Collector {
    pub fn snapshot(&self) -> Vec<AppUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Map that records every attach/detach and rejects configured incident ids.
#[derive(Clone, Default)]
pub struct RecordingMap {
    pub attached: Arc<Mutex<Vec<String>>>,
    pub detached: Arc<Mutex<Vec<u64>>>,
    pub reject: Arc<Mutex<HashSet<String>>>,
    next: Arc<Mutex<u64>>,
}

impl RecordingMap {
    pub fn rejecting(ids: &[&str]) -> Self {
        let map = Self::default();
        map.reject
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        map
    }

    pub fn attach_count(&self) -> usize {
        self.attached.lock().unwrap().len()
    }
}

impl MapProvider for RecordingMap {
    fn attach_marker(&mut self, marker: &MarkerState) -> Result<MarkerHandle, MapError> {
        if self.reject.lock().unwrap().contains(&marker.incident_id) {
            return Err(MapError::Rejected(format!("no icon for {}", marker.incident_id)));
        }
        self.attached
            .lock()
            .unwrap()
            .push(marker.incident_id.clone());
        let mut next = self.next.lock().unwrap();
        *next += 1;
        Ok(MarkerHandle(*next))
    }

    fn detach_marker(&mut self, handle: MarkerHandle) {
        self.detached.lock().unwrap().push(handle.0);
    }
}

pub struct Harness {
    pub app: Arc<BeaconApp>,
    pub relay: Arc<InMemoryRoomRelay>,
    pub map: RecordingMap,
    pub updates: Collector,
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    incidents: Vec<Incident>,
    location: Option<Coordinate>,
    relay: Arc<InMemoryRoomRelay>,
    map: RecordingMap,
    config: Option<serde_json::Value>,
    source: Option<Arc<dyn beacon_core::IncidentSource>>,
}

impl HarnessBuilder {
    pub fn new(incidents: Vec<Incident>) -> Self {
        Self {
            incidents,
            location: None,
            relay: Arc::new(InMemoryRoomRelay::new()),
            map: RecordingMap::default(),
            config: None,
            source: None,
        }
    }

    pub fn location(mut self, at: Coordinate) -> Self {
        self.location = Some(at);
        self
    }

    pub fn map(mut self, map: RecordingMap) -> Self {
        self.map = map;
        self
    }

    pub fn config(mut self, v: serde_json::Value) -> Self {
        self.config = Some(v);
        self
    }

    pub fn source(mut self, source: Arc<dyn beacon_core::IncidentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn start(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        if let Some(v) = &self.config {
            std::fs::write(
                dir.path().join(beacon_core::CONFIG_FILE_NAME),
                serde_json::to_vec(v).unwrap(),
            )
            .unwrap();
        }
        let source: Arc<dyn beacon_core::IncidentSource> = match self.source {
            Some(source) => source,
            None => Arc::new(StaticIncidents(self.incidents)),
        };
        let collaborators = Collaborators::new(
            source,
            Arc::new(FixedLocation(self.location)),
            self.relay.clone(),
        )
        .with_map(Box::new(self.map.clone()));
        let app = BeaconApp::new(data_dir, collaborators).unwrap();
        let updates = Collector::default();
        app.listen_for_updates(Box::new(updates.clone()));
        Harness {
            app,
            relay: self.relay,
            map: self.map,
            updates,
            dir,
        }
    }
}
