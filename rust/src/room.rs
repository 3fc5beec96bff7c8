//! Single-room chat session.
//!
//! `Closed -> Opening -> Open -> Closing -> Closed`. A switch from one room to
//! another runs `Closing` for the old room to completion (token invalidated,
//! subscription released, feed cleared) before `Opening` the new one.
//!
//! Every inbound event is tagged with the [`RoomToken`] it was issued under.
//! Only the token of the active room is accepted; anything else is dropped.

use beacon_relay::{ChatMessage, RoomTransport, SubscriptionGuard, TransportError};
use flume::Receiver;
use serde::{Deserialize, Serialize};

use crate::feed::{AppendOutcome, MessageFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Opaque subscription token. Issued by [`RoomSession::open`], never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomToken(u64);

impl std::fmt::Display for RoomToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("subscription to room {room_id} failed: {source}")]
pub struct SubscriptionFailure {
    pub room_id: String,
    #[source]
    pub source: TransportError,
}

/// Receivers for a freshly opened room, to be drained off the actor thread.
/// Everything read from them must be fed back tagged with `token`.
#[derive(Debug)]
pub struct RoomPump {
    pub token: RoomToken,
    pub room_id: String,
    pub messages: Receiver<ChatMessage>,
    /// `None` when the transport already confirmed during `open`.
    pub ready: Option<Receiver<Result<(), TransportError>>>,
}

#[derive(Debug)]
pub enum OpenOutcome {
    /// Already open (or opening) for this room.
    Unchanged,
    Opened(RoomPump),
    Pending(RoomPump),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Stale,
    Opened,
    Failed(SubscriptionFailure),
}

#[derive(Debug)]
struct ActiveRoom {
    room_id: String,
    token: RoomToken,
    _guard: SubscriptionGuard,
}

#[derive(Debug)]
pub struct RoomSession {
    status: RoomStatus,
    active: Option<ActiveRoom>,
    next_token: u64,
    feed: MessageFeed,
}

impl Default for RoomSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomSession {
    pub fn new() -> Self {
        Self {
            status: RoomStatus::Closed,
            active: None,
            next_token: 1,
            feed: MessageFeed::new(),
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Room being opened or open.
    pub fn current_room(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.room_id.as_str())
    }

    /// Room only if fully open.
    pub fn open_room(&self) -> Option<&str> {
        match self.status {
            RoomStatus::Open => self.current_room(),
            _ => None,
        }
    }

    pub fn is_current(&self, token: RoomToken) -> bool {
        self.active.as_ref().map(|a| a.token) == Some(token)
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn open(
        &mut self,
        transport: &dyn RoomTransport,
        incident_id: &str,
    ) -> Result<OpenOutcome, SubscriptionFailure> {
        if self.current_room() == Some(incident_id)
            && matches!(self.status, RoomStatus::Open | RoomStatus::Opening)
        {
            return Ok(OpenOutcome::Unchanged);
        }

        self.teardown();

        let token = RoomToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        self.status = RoomStatus::Opening;
        tracing::info!(room_id = incident_id, %token, "room opening");

        let subscription = match transport.subscribe_room(incident_id) {
            Ok(s) => s,
            Err(source) => {
                self.status = RoomStatus::Closed;
                tracing::warn!(room_id = incident_id, %source, "room subscribe failed");
                return Err(SubscriptionFailure {
                    room_id: incident_id.to_string(),
                    source,
                });
            }
        };
        let early = subscription.try_ready();
        let (guard, messages, ready) = subscription.into_parts();

        match early {
            Some(Err(source)) => {
                drop(guard);
                self.status = RoomStatus::Closed;
                tracing::warn!(room_id = incident_id, %source, "room rejected on subscribe");
                Err(SubscriptionFailure {
                    room_id: incident_id.to_string(),
                    source,
                })
            }
            Some(Ok(())) => {
                self.active = Some(ActiveRoom {
                    room_id: incident_id.to_string(),
                    token,
                    _guard: guard,
                });
                self.status = RoomStatus::Open;
                tracing::info!(room_id = incident_id, %token, "room open");
                Ok(OpenOutcome::Opened(RoomPump {
                    token,
                    room_id: incident_id.to_string(),
                    messages,
                    ready: None,
                }))
            }
            None => {
                self.active = Some(ActiveRoom {
                    room_id: incident_id.to_string(),
                    token,
                    _guard: guard,
                });
                Ok(OpenOutcome::Pending(RoomPump {
                    token,
                    room_id: incident_id.to_string(),
                    messages,
                    ready: Some(ready),
                }))
            }
        }
    }

    /// Applies the transport's answer to a pending open.
    pub fn confirm(
        &mut self,
        token: RoomToken,
        result: Result<(), TransportError>,
    ) -> Confirmation {
        if !self.is_current(token) || self.status != RoomStatus::Opening {
            tracing::debug!(%token, "dropping stale room confirmation");
            return Confirmation::Stale;
        }
        match result {
            Ok(()) => {
                self.status = RoomStatus::Open;
                tracing::info!(room_id = ?self.current_room(), %token, "room open");
                Confirmation::Opened
            }
            Err(source) => {
                let room_id = self.current_room().unwrap_or_default().to_string();
                tracing::warn!(%room_id, %source, "room subscription failed");
                self.teardown();
                Confirmation::Failed(SubscriptionFailure { room_id, source })
            }
        }
    }

    /// Routes one inbound message into the feed. `None` means the token was
    /// stale and the message was dropped.
    pub fn accept(&mut self, token: RoomToken, msg: ChatMessage) -> Option<AppendOutcome> {
        if !self.is_current(token) {
            tracing::debug!(%token, message_id = %msg.id, "dropping message from stale subscription");
            return None;
        }
        Some(self.feed.append(msg))
    }

    /// Returns whether a room was actually closed.
    pub fn close(&mut self) -> bool {
        if self.active.is_none() && self.status == RoomStatus::Closed {
            return false;
        }
        let room_id = self.current_room().map(str::to_string);
        self.teardown();
        tracing::info!(?room_id, "room closed");
        true
    }

    fn teardown(&mut self) {
        if self.active.is_some() {
            self.status = RoomStatus::Closing;
        }
        // Dropping the guard unsubscribes; with `active` gone the token no
        // longer matches anything.
        self.active = None;
        self.feed.clear();
        self.status = RoomStatus::Closed;
    }
}
