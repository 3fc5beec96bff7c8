//! Map marker reconciliation.
//!
//! [`plan_reconcile`] is a pure diff between the tracked marker ids and a
//! target incident list. [`MarkerSetManager`] executes a plan against a
//! [`MapProvider`], which is the only thing that touches the real map.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::incident::Incident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorKey {
    Blue,
    Red,
    Gray,
    Yellow,
}

impl ColorKey {
    /// First recognised category (set order) decides; anything else is yellow.
    pub fn for_categories(categories: &BTreeSet<String>) -> Self {
        categories
            .iter()
            .find_map(|c| match c.to_ascii_lowercase().as_str() {
                "hurricane" | "flood" => Some(ColorKey::Blue),
                "wildfire" => Some(ColorKey::Red),
                "earthquake" => Some(ColorKey::Gray),
                _ => None,
            })
            .unwrap_or(ColorKey::Yellow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorKey::Blue => "blue",
            ColorKey::Red => "red",
            ColorKey::Gray => "gray",
            ColorKey::Yellow => "yellow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerState {
    pub incident_id: String,
    pub rendered_coordinate: Coordinate,
    pub color_key: ColorKey,
}

impl MarkerState {
    pub fn for_incident(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            rendered_coordinate: incident.coordinate,
            color_key: ColorKey::for_categories(&incident.categories),
        }
    }
}

/// Provider-side identity of an attached marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("map provider rejected marker: {0}")]
    Rejected(String),
    #[error("map provider unavailable")]
    Unavailable,
}

/// External map surface. Markers are expensive to build there, so the manager
/// only calls it for real membership changes.
pub trait MapProvider: Send + 'static {
    fn attach_marker(&mut self, marker: &MarkerState) -> Result<MarkerHandle, MapError>;
    fn detach_marker(&mut self, handle: MarkerHandle);
}

/// Provider for headless runs: accepts everything, draws nothing.
#[derive(Debug, Default)]
pub struct HeadlessMap {
    next_handle: u64,
}

impl MapProvider for HeadlessMap {
    fn attach_marker(&mut self, _marker: &MarkerState) -> Result<MarkerHandle, MapError> {
        self.next_handle += 1;
        Ok(MarkerHandle(self.next_handle))
    }

    fn detach_marker(&mut self, _handle: MarkerHandle) {}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Markers to build, in target order.
    pub create: Vec<MarkerState>,
    /// Tracked incident ids to drop, sorted.
    pub remove: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.remove.is_empty()
    }
}

pub fn plan_reconcile<'a>(
    tracked: impl IntoIterator<Item = &'a str>,
    target: &[Incident],
) -> ReconcilePlan {
    let tracked: HashSet<&str> = tracked.into_iter().collect();
    let mut wanted: HashSet<&str> = HashSet::with_capacity(target.len());
    let mut create = Vec::new();
    for incident in target {
        if !wanted.insert(incident.id.as_str()) {
            continue;
        }
        if !tracked.contains(incident.id.as_str()) {
            create.push(MarkerState::for_incident(incident));
        }
    }
    let mut remove: Vec<String> = tracked
        .iter()
        .filter(|id| !wanted.contains(*id))
        .map(|id| id.to_string())
        .collect();
    remove.sort();
    ReconcilePlan { create, remove }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<(String, MapError)>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug)]
struct TrackedMarker {
    state: MarkerState,
    handle: MarkerHandle,
}

pub struct MarkerSetManager {
    tracked: HashMap<String, TrackedMarker>,
    by_handle: HashMap<MarkerHandle, String>,
    provider: Box<dyn MapProvider>,
}

impl MarkerSetManager {
    pub fn new(provider: Box<dyn MapProvider>) -> Self {
        Self {
            tracked: HashMap::new(),
            by_handle: HashMap::new(),
            provider,
        }
    }

    /// Brings the attached markers in line with `target`.
    ///
    /// A marker the provider refuses is logged, reported and left untracked,
    /// so the next reconcile tries it again; the rest of the batch proceeds.
    pub fn reconcile(&mut self, target: &[Incident]) -> ReconcileReport {
        let plan = plan_reconcile(self.tracked.keys().map(String::as_str), target);
        let mut report = ReconcileReport::default();
        if plan.is_empty() {
            return report;
        }

        for incident_id in plan.remove {
            if let Some(marker) = self.tracked.remove(&incident_id) {
                self.by_handle.remove(&marker.handle);
                self.provider.detach_marker(marker.handle);
                report.removed.push(incident_id);
            }
        }

        for state in plan.create {
            match self.provider.attach_marker(&state) {
                Ok(handle) => {
                    self.by_handle.insert(handle, state.incident_id.clone());
                    report.created.push(state.incident_id.clone());
                    self.tracked
                        .insert(state.incident_id.clone(), TrackedMarker { state, handle });
                }
                Err(e) => {
                    tracing::warn!(incident_id = %state.incident_id, %e, "marker creation failed");
                    report.failed.push((state.incident_id, e));
                }
            }
        }

        tracing::debug!(
            created = report.created.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            tracked = self.tracked.len(),
            "markers reconciled"
        );
        report
    }

    /// Incident bound to a clicked marker. Selection only; opening a room is
    /// up to the caller.
    pub fn incident_for_handle(&self, handle: MarkerHandle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    pub fn contains(&self, incident_id: &str) -> bool {
        self.tracked.contains_key(incident_id)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Snapshot of tracked markers sorted by incident id.
    pub fn markers(&self) -> Vec<MarkerState> {
        let mut out: Vec<MarkerState> = self.tracked.values().map(|m| m.state.clone()).collect();
        out.sort_by(|a, b| a.incident_id.cmp(&b.incident_id));
        out
    }

    /// Detaches everything, e.g. when the map surface goes away.
    pub fn clear(&mut self) {
        for (_, marker) in self.tracked.drain() {
            self.provider.detach_marker(marker.handle);
        }
        self.by_handle.clear();
    }
}

impl std::fmt::Debug for MarkerSetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerSetManager")
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}
