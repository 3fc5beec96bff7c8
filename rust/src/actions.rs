use crate::geo::Coordinate;
use crate::state::MarkerScope;
use crate::Author;

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    // Incidents + location
    RefreshIncidents,
    ResolveLocation,
    SetLocation {
        coordinate: Option<Coordinate>,
    },

    // Identity (supplied by the auth layer)
    SetIdentity {
        author: Author,
    },
    ClearIdentity,

    // Map
    SetMarkerScope {
        scope: MarkerScope,
    },
    MarkerClicked {
        incident_id: String,
    },

    // Rooms
    OpenRoom {
        incident_id: String,
    },
    CloseRoom,
    UpdateDraft {
        text: String,
    },
    SendMessage {
        room_id: String,
        text: String,
    },

    // UI
    ClearError,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or identities).
    pub fn tag(&self) -> &'static str {
        match self {
            // Incidents + location
            AppAction::RefreshIncidents => "RefreshIncidents",
            AppAction::ResolveLocation => "ResolveLocation",
            AppAction::SetLocation { .. } => "SetLocation",

            // Identity
            AppAction::SetIdentity { .. } => "SetIdentity",
            AppAction::ClearIdentity => "ClearIdentity",

            // Map
            AppAction::SetMarkerScope { .. } => "SetMarkerScope",
            AppAction::MarkerClicked { .. } => "MarkerClicked",

            // Rooms
            AppAction::OpenRoom { .. } => "OpenRoom",
            AppAction::CloseRoom => "CloseRoom",
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SendMessage { .. } => "SendMessage",

            // UI
            AppAction::ClearError => "ClearError",
        }
    }
}
