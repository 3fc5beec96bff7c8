use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::incident::Incident;
use crate::markers::MarkerState;
use crate::room::RoomStatus;
use crate::{Author, ChatMessage};

/// Continental US centre; used when there is neither a user location nor an
/// incident to centre on.
pub const DEFAULT_MAP_CENTER: Coordinate = Coordinate {
    latitude: 37.0902,
    longitude: -95.7129,
};

/// Which incidents get a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkerScope {
    #[default]
    Nearby,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    FetchFailure,
    SubscriptionFailure,
    StaleRoom,
    MarkerCreationFailure,
    ComposeFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FetchFailure => "fetch_failure",
            ErrorKind::SubscriptionFailure => "subscription_failure",
            ErrorKind::StaleRoom => "stale_room",
            ErrorKind::MarkerCreationFailure => "marker_creation_failure",
            ErrorKind::ComposeFailure => "compose_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusyState {
    pub fetching_incidents: bool,
    pub resolving_location: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub message: ChatMessage,
    pub is_own: bool,
    pub author_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub incident_id: Option<String>,
    pub status: RoomStatus,
    pub messages: Vec<MessageView>,
}

impl Default for RoomView {
    fn default() -> Self {
        Self {
            incident_id: None,
            status: RoomStatus::Closed,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub rev: u64,
    pub incidents: Vec<Incident>,
    pub nearby: Vec<Incident>,
    pub origin: Option<Coordinate>,
    pub radius_km: f64,
    pub marker_scope: MarkerScope,
    pub markers: Vec<MarkerState>,
    pub highlighted_incident: Option<String>,
    pub room: RoomView,
    pub identity: Option<Author>,
    pub draft: String,
    pub last_error: Option<ErrorEvent>,
    pub busy: BusyState,
}

impl AppState {
    pub fn empty(radius_km: f64) -> Self {
        Self {
            rev: 0,
            incidents: Vec::new(),
            nearby: Vec::new(),
            origin: None,
            radius_km,
            marker_scope: MarkerScope::default(),
            markers: Vec::new(),
            highlighted_incident: None,
            room: RoomView::default(),
            identity: None,
            draft: String::new(),
            last_error: None,
            busy: BusyState::default(),
        }
    }

    pub fn incident(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// User location, else the first incident, else [`DEFAULT_MAP_CENTER`].
    pub fn map_center(&self) -> Coordinate {
        self.origin
            .or_else(|| self.incidents.first().map(|i| i.coordinate))
            .unwrap_or(DEFAULT_MAP_CENTER)
    }
}
