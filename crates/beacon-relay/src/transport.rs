use crate::message::Author;
use crate::subscription::RoomSubscription;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unreachable: {0}")]
    Unreachable(String),
    #[error("invalid room: {0}")]
    InvalidRoom(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("subscription disconnected")]
    Disconnected,
}

/// Real-time push/append primitive for incident rooms.
///
/// Delivery is at-least-once and may reorder; every delivered message carries
/// enough (timestamp, id) to recover the room order.
pub trait RoomTransport: Send + Sync + 'static {
    /// Starts a subscription scoped to `room_id`. The returned handle delivers
    /// the room history followed by live appends, and signals readiness once
    /// the transport has confirmed the subscription.
    fn subscribe_room(&self, room_id: &str) -> Result<RoomSubscription, TransportError>;

    /// Fire-and-forget append. Success only means the write was handed to the
    /// transport; the message becomes visible when a subscription echoes it.
    fn append_message(
        &self,
        room_id: &str,
        author: &Author,
        text: &str,
    ) -> Result<(), TransportError>;
}
