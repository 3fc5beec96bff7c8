pub(crate) mod config;

use std::sync::{Arc, RwLock};

use beacon_relay::{RoomTransport, TransportError};
use flume::Sender;

use crate::actions::AppAction;
use crate::collaborators::{Collaborators, IncidentSource, LocationResolver};
use crate::composer::{ComposeError, MessageComposer};
use crate::feed::AppendOutcome;
use crate::format::author_label;
use crate::geo::Coordinate;
use crate::incident::{FetchError, Incident};
use crate::markers::MarkerSetManager;
use crate::proximity;
use crate::room::{Confirmation, OpenOutcome, RoomPump, RoomSession, RoomToken};
use crate::state::{AppState, ErrorEvent, ErrorKind, MarkerScope, MessageView, RoomView};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::ChatMessage;

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    incident_source: Arc<dyn IncidentSource>,
    location_resolver: Arc<dyn LocationResolver>,
    transport: Arc<dyn RoomTransport>,

    markers: MarkerSetManager,
    room: RoomSession,
    composer: MessageComposer,

    // Bumped per request; results carrying an older token are dropped.
    fetch_token: u64,
    location_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty(config.nearby_radius_km());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()?;

        let Collaborators {
            incidents,
            location,
            transport,
            map,
        } = collaborators;

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            incident_source: incidents,
            location_resolver: location,
            transport,
            markers: MarkerSetManager::new(map),
            room: RoomSession::new(),
            composer: MessageComposer::new(),
            fetch_token: 0,
            location_token: 0,
        };
        tracing::info!(
            radius_km = this.state.radius_km,
            network = this.config.network_enabled(),
            "app core ready"
        );
        this.commit_state_snapshot(&this.state);
        Ok(this)
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.sync_room_view();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_error(&mut self, kind: ErrorKind, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(kind = kind.as_str(), %detail, "error");
        self.state.last_error = Some(ErrorEvent {
            kind,
            detail: detail.clone(),
        });
        let rev = self.next_rev();
        let _ = self
            .update_sender
            .send(AppUpdate::Error { rev, kind, detail });
    }

    fn emit_room_changed(&mut self) {
        let rev = self.next_rev();
        let incident_id = self.room.open_room().map(str::to_string);
        let _ = self
            .update_sender
            .send(AppUpdate::RoomChanged { rev, incident_id });
    }

    fn sync_room_view(&mut self) {
        let me = self.state.identity.as_ref().map(|a| a.key.as_str());
        let messages = self
            .room
            .feed()
            .messages()
            .iter()
            .map(|m| MessageView {
                message: m.clone(),
                is_own: me.is_some_and(|k| m.is_authored_by(k)),
                author_label: author_label(m, me).to_string(),
            })
            .collect();
        self.state.room = RoomView {
            incident_id: self.room.current_room().map(str::to_string),
            status: self.room.status(),
            messages,
        };
        self.state.draft = self.composer.draft().to_string();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::RefreshIncidents => self.refresh_incidents(),
            AppAction::ResolveLocation => self.resolve_location(),
            AppAction::SetLocation { coordinate } => {
                // A manual location wins over any lookup still in flight.
                self.location_token = self.location_token.wrapping_add(1);
                self.state.busy.resolving_location = false;
                self.set_origin(coordinate);
                self.emit_state();
            }
            AppAction::SetIdentity { author } => {
                self.state.identity = Some(author);
                self.emit_state();
            }
            AppAction::ClearIdentity => {
                self.state.identity = None;
                self.emit_state();
            }
            AppAction::SetMarkerScope { scope } => {
                if self.state.marker_scope != scope {
                    self.state.marker_scope = scope;
                    self.reconcile_markers();
                }
                self.emit_state();
            }
            AppAction::MarkerClicked { incident_id } => {
                // Highlight only; the room opens on explicit request.
                if self.markers.contains(&incident_id) {
                    self.state.highlighted_incident = Some(incident_id);
                    self.emit_state();
                } else {
                    tracing::debug!(%incident_id, "click on untracked marker ignored");
                }
            }
            AppAction::OpenRoom { incident_id } => self.open_room(&incident_id),
            AppAction::CloseRoom => {
                let was_open = self.room.open_room().is_some();
                if self.room.close() {
                    self.composer.clear_draft();
                    if was_open {
                        self.emit_room_changed();
                    }
                    self.emit_state();
                }
            }
            AppAction::UpdateDraft { text } => {
                self.composer.set_draft(text);
                self.emit_state();
            }
            AppAction::SendMessage { room_id, text } => self.send_message(&room_id, &text),
            AppAction::ClearError => {
                if self.state.last_error.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::IncidentsFetched { token, result } => {
                self.handle_incidents_fetched(token, result)
            }
            InternalEvent::LocationResolved { token, coordinate } => {
                if token != self.location_token {
                    tracing::debug!(token, "dropping stale location result");
                    return;
                }
                self.state.busy.resolving_location = false;
                if coordinate.is_none() {
                    tracing::info!("user location unavailable");
                }
                self.set_origin(coordinate);
                self.emit_state();
            }
            InternalEvent::RoomReady { token, result } => self.handle_room_ready(token, result),
            InternalEvent::RoomMessage { token, message } => {
                self.handle_room_message(token, message)
            }
        }
    }

    // Incidents + proximity

    fn refresh_incidents(&mut self) {
        self.fetch_token = self.fetch_token.wrapping_add(1);
        let token = self.fetch_token;
        self.state.busy.fetching_incidents = true;
        self.emit_state();

        let source = self.incident_source.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = source.fetch_active_incidents().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::IncidentsFetched { token, result },
            )));
        });
    }

    fn handle_incidents_fetched(&mut self, token: u64, result: Result<Vec<Incident>, FetchError>) {
        if token != self.fetch_token {
            tracing::debug!(token, "dropping stale incident fetch");
            return;
        }
        self.state.busy.fetching_incidents = false;
        match result {
            Ok(incidents) => {
                tracing::info!(count = incidents.len(), "incidents fetched");
                self.state.incidents = incidents;
            }
            Err(e) => {
                self.state.incidents.clear();
                self.emit_error(ErrorKind::FetchFailure, e.to_string());
            }
        }
        self.recompute_nearby();
        self.emit_state();
    }

    fn resolve_location(&mut self) {
        self.location_token = self.location_token.wrapping_add(1);
        let token = self.location_token;
        self.state.busy.resolving_location = true;
        self.emit_state();

        let resolver = self.location_resolver.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let coordinate = resolver.resolve_user_location().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::LocationResolved { token, coordinate },
            )));
        });
    }

    fn set_origin(&mut self, coordinate: Option<Coordinate>) {
        self.state.origin = coordinate;
        self.recompute_nearby();
    }

    fn recompute_nearby(&mut self) {
        let nearby =
            proximity::nearby(self.state.origin, &self.state.incidents, self.state.radius_km);
        // Order and content both count; observers render this list as-is.
        let changed = nearby != self.state.nearby;
        self.state.nearby = nearby;
        if changed {
            let rev = self.next_rev();
            let _ = self.update_sender.send(AppUpdate::NearbyChanged {
                rev,
                incidents: self.state.nearby.clone(),
            });
        }
        self.reconcile_markers();
    }

    fn reconcile_markers(&mut self) {
        let target: &[Incident] = match self.state.marker_scope {
            MarkerScope::Nearby => &self.state.nearby,
            MarkerScope::All => &self.state.incidents,
        };
        let report = self.markers.reconcile(target);
        self.state.markers = self.markers.markers();
        if let Some(id) = self.state.highlighted_incident.as_deref() {
            if !self.markers.contains(id) {
                self.state.highlighted_incident = None;
            }
        }
        if !report.is_noop() {
            tracing::debug!(
                created = report.created.len(),
                removed = report.removed.len(),
                failed = report.failed.len(),
                "markers reconciled"
            );
        }
        for (incident_id, err) in report.failed {
            self.emit_error(
                ErrorKind::MarkerCreationFailure,
                format!("marker for incident {incident_id}: {err}"),
            );
        }
    }

    // Rooms

    fn open_room(&mut self, incident_id: &str) {
        let previously_open = self.room.open_room().map(str::to_string);
        let previous = self.room.current_room().map(str::to_string);

        match self.room.open(&*self.transport, incident_id) {
            Ok(OpenOutcome::Unchanged) => {}
            Ok(OpenOutcome::Opened(pump)) => {
                self.composer.clear_draft();
                self.spawn_room_pump(pump);
                self.emit_room_changed();
                self.emit_state();
            }
            Ok(OpenOutcome::Pending(pump)) => {
                if previous.as_deref() != Some(incident_id) {
                    self.composer.clear_draft();
                }
                self.spawn_room_pump(pump);
                if previously_open.is_some() {
                    self.emit_room_changed();
                }
                self.emit_state();
            }
            Err(failure) => {
                self.composer.clear_draft();
                if previously_open.is_some() {
                    self.emit_room_changed();
                }
                self.emit_error(ErrorKind::SubscriptionFailure, failure.to_string());
                self.emit_state();
            }
        }
    }

    fn spawn_room_pump(&self, pump: RoomPump) {
        let tx = self.core_sender.clone();
        let ready_timeout = self.config.subscribe_timeout();
        self.runtime.spawn(async move {
            let RoomPump {
                token,
                room_id,
                messages,
                ready,
            } = pump;

            if let Some(ready) = ready {
                let result = match tokio::time::timeout(ready_timeout, ready.recv_async()).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(TransportError::Disconnected),
                    Err(_) => Err(TransportError::Timeout(format!(
                        "room {room_id} not ready after {}s",
                        ready_timeout.as_secs()
                    ))),
                };
                let confirmed = result.is_ok();
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RoomReady {
                    token,
                    result,
                })));
                if !confirmed {
                    return;
                }
            }

            while let Ok(message) = messages.recv_async().await {
                let event = InternalEvent::RoomMessage { token, message };
                if tx.send(CoreMsg::Internal(Box::new(event))).is_err() {
                    break;
                }
            }
            tracing::debug!(%token, %room_id, "room pump finished");
        });
    }

    fn handle_room_ready(&mut self, token: RoomToken, result: Result<(), TransportError>) {
        match self.room.confirm(token, result) {
            Confirmation::Stale => {}
            Confirmation::Opened => {
                self.emit_room_changed();
                self.emit_state();
            }
            Confirmation::Failed(failure) => {
                self.composer.clear_draft();
                self.emit_error(ErrorKind::SubscriptionFailure, failure.to_string());
                self.emit_state();
            }
        }
    }

    fn handle_room_message(&mut self, token: RoomToken, message: ChatMessage) {
        let update = message.clone();
        match self.room.accept(token, message) {
            None | Some(AppendOutcome::Duplicate) => {}
            Some(AppendOutcome::Inserted) | Some(AppendOutcome::Confirmed) => {
                let rev = self.next_rev();
                let _ = self.update_sender.send(AppUpdate::Message {
                    rev,
                    message: update,
                });
                self.emit_state();
            }
        }
    }

    fn send_message(&mut self, room_id: &str, text: &str) {
        let Some(author) = self.state.identity.clone() else {
            self.emit_error(ErrorKind::ComposeFailure, "sign in before sending messages");
            self.emit_state();
            return;
        };
        let result = self
            .composer
            .send(&self.room, &*self.transport, room_id, &author, text);
        match result {
            Ok(()) => {}
            Err(e @ ComposeError::StaleRoom { .. }) => {
                self.emit_error(ErrorKind::StaleRoom, e.to_string());
            }
            Err(e) => {
                self.emit_error(ErrorKind::ComposeFailure, e.to_string());
            }
        }
        self.emit_state();
    }
}
