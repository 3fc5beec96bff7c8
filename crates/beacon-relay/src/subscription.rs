use std::fmt;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, TryRecvError};

use crate::message::ChatMessage;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type ReleaseFn = Box<dyn FnOnce(SubscriptionId) + Send>;

/// Owns one live subscription on the transport side.
///
/// Dropping the guard unsubscribes. Every exit path (room switch, close,
/// failed open, app teardown) therefore releases the transport subscription
/// without an explicit call.
pub struct SubscriptionGuard {
    id: SubscriptionId,
    release: Option<ReleaseFn>,
}

impl SubscriptionGuard {
    pub fn new(id: SubscriptionId, release: impl FnOnce(SubscriptionId) + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// Guard with nothing to release, for transports without server-side state.
    pub fn detached(id: SubscriptionId) -> Self {
        Self { id, release: None }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!(subscription = %self.id, "unsubscribe");
            release(self.id);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("id", &self.id)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Receiver side of a room subscription plus its keepalive guard.
pub struct RoomSubscription {
    messages: Receiver<ChatMessage>,
    ready: Receiver<Result<(), TransportError>>,
    guard: SubscriptionGuard,
}

impl RoomSubscription {
    pub fn new(
        messages: Receiver<ChatMessage>,
        ready: Receiver<Result<(), TransportError>>,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            messages,
            ready,
            guard,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.guard.id()
    }

    /// Non-blocking readiness probe. `None` means the transport has not
    /// answered yet.
    pub fn try_ready(&self) -> Option<Result<(), TransportError>> {
        match self.ready.try_recv() {
            Ok(res) => Some(res),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::Disconnected)),
        }
    }

    pub fn wait_ready(&self, timeout: Duration) -> Result<(), TransportError> {
        match self.ready.recv_timeout(timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(
                "timed out waiting for room subscription ready".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    pub fn try_recv(&self) -> Result<ChatMessage, TryRecvError> {
        self.messages.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChatMessage, RecvTimeoutError> {
        self.messages.recv_timeout(timeout)
    }

    /// Splits the handle so the message and ready receivers can move into a
    /// pump task while the guard stays with the owner of the room.
    pub fn into_parts(
        self,
    ) -> (
        SubscriptionGuard,
        Receiver<ChatMessage>,
        Receiver<Result<(), TransportError>>,
    ) {
        (self.guard, self.messages, self.ready)
    }
}

impl fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
