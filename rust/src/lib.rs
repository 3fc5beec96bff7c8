mod actions;
mod collaborators;
mod composer;
mod core;
mod feed;
mod format;
mod geo;
mod incident;
mod logging;
mod markers;
mod proximity;
mod room;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use beacon_relay::{
    Author, ChatMessage, InMemoryRoomRelay, RoomSubscription, RoomTransport, SubscriptionGuard,
    SubscriptionId, TransportError,
};
pub use collaborators::*;
pub use composer::{ComposeError, MessageComposer};
pub use crate::core::config::{load_app_config, AppConfig, CONFIG_FILE_NAME};
pub use feed::{feed_order, AppendOutcome, MessageFeed};
pub use format::{author_label, format_message_time, format_time_ago};
pub use geo::{distance_km, Coordinate, CoordinateError, EARTH_RADIUS_KM};
pub use incident::{incidents_from_records, parse_incident_records, FetchError, Incident};
pub use logging::{init_logging, LOG_FILE_NAME};
pub use markers::*;
pub use proximity::{nearby, nearby_with_distance, DEFAULT_NEARBY_RADIUS_KM};
pub use room::{
    Confirmation, OpenOutcome, RoomPump, RoomSession, RoomStatus, RoomToken, SubscriptionFailure,
};
pub use state::*;
pub use updates::*;

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle to the app actor. All mutation goes through [`BeaconApp::dispatch`];
/// the actor publishes a fresh [`AppState`] after every change.
pub struct BeaconApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl BeaconApp {
    pub fn new(data_dir: String, collaborators: Collaborators) -> anyhow::Result<Arc<Self>> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "BeaconApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty(DEFAULT_NEARBY_RADIUS_KM)));

        // Built here so a runtime failure surfaces to the caller.
        let mut core = crate::core::AppCore::new(
            update_tx,
            core_tx.clone(),
            data_dir,
            shared_state.clone(),
            collaborators,
        )?;

        // Actor loop thread (single threaded "app actor").
        thread::Builder::new()
            .name("beacon-core".into())
            .spawn(move || {
                while let Ok(msg) = core_rx.recv() {
                    core.handle_message(msg);
                }
            })?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        }))
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split updates.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}
