//! Room transport seam for incident chat rooms.
//!
//! The core never talks to a concrete push service; it goes through
//! [`RoomTransport`]. [`InMemoryRoomRelay`] is the process-local transport used
//! by tests and the CLI.

pub mod message;
pub mod relay;
pub mod subscription;
pub mod transport;

pub use message::{Author, ChatMessage};
pub use relay::InMemoryRoomRelay;
pub use subscription::{RoomSubscription, SubscriptionGuard, SubscriptionId};
pub use transport::{RoomTransport, TransportError};
