use beacon_relay::TransportError;

use crate::geo::Coordinate;
use crate::incident::{FetchError, Incident};
use crate::room::RoomToken;
use crate::state::{AppState, ErrorKind};
use crate::{AppAction, ChatMessage};

#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum AppUpdate {
    /// Full snapshot after every change.
    FullState(AppState),
    NearbyChanged {
        rev: u64,
        incidents: Vec<Incident>,
    },
    RoomChanged {
        rev: u64,
        incident_id: Option<String>,
    },
    Message {
        rev: u64,
        message: ChatMessage,
    },
    Error {
        rev: u64,
        kind: ErrorKind,
        detail: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::NearbyChanged { rev, .. } => *rev,
            AppUpdate::RoomChanged { rev, .. } => *rev,
            AppUpdate::Message { rev, .. } => *rev,
            AppUpdate::Error { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Async collaborator results
    IncidentsFetched {
        token: u64,
        result: Result<Vec<Incident>, FetchError>,
    },
    LocationResolved {
        token: u64,
        coordinate: Option<Coordinate>,
    },

    // Room subscription pump
    RoomReady {
        token: RoomToken,
        result: Result<(), TransportError>,
    },
    RoomMessage {
        token: RoomToken,
        message: ChatMessage,
    },
}
