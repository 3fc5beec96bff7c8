use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use flume::Sender;

use crate::message::{Author, ChatMessage};
use crate::subscription::{RoomSubscription, SubscriptionGuard, SubscriptionId};
use crate::transport::{RoomTransport, TransportError};

#[derive(Debug)]
struct Subscriber {
    room_id: String,
    tx: Sender<ChatMessage>,
    ready_tx: Option<Sender<Result<(), TransportError>>>,
}

#[derive(Debug)]
struct RelayState {
    rooms: HashMap<String, Vec<ChatMessage>>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_sub_id: u64,
    last_timestamp: i64,
    reachable: bool,
    defer_ready: bool,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            rooms: HashMap::new(),
            subscribers: HashMap::new(),
            next_sub_id: 1,
            last_timestamp: 0,
            reachable: true,
            defer_ready: false,
        }
    }
}

impl RelayState {
    fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn fan_out(&mut self, room_id: &str, msg: &ChatMessage) -> usize {
        let mut delivered = 0usize;
        self.subscribers.retain(|_, sub| {
            if sub.room_id != room_id {
                return true;
            }
            match sub.tx.send(msg.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }
}

/// Process-local room transport.
///
/// Keeps every room's history in memory, replays it to each new subscriber and
/// fans appends out to live subscribers. Timestamps are unix milliseconds,
/// strictly increasing across the whole relay.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoomRelay {
    state: Arc<Mutex<RelayState>>,
}

impl InMemoryRoomRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// When unreachable, new subscriptions and appends fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Holds back subscription confirmations until [`Self::release_ready`].
    pub fn set_defer_ready(&self, defer: bool) {
        self.lock().defer_ready = defer;
    }

    /// Confirms every subscription still waiting for readiness. Returns how
    /// many were confirmed.
    pub fn release_ready(&self) -> usize {
        let mut state = self.lock();
        let mut released = 0usize;
        for sub in state.subscribers.values_mut() {
            if let Some(ready_tx) = sub.ready_tx.take() {
                let _ = ready_tx.send(Ok(()));
                released += 1;
            }
        }
        released
    }

    /// Fails every subscription still waiting for readiness.
    pub fn fail_pending(&self, reason: &str) -> usize {
        let mut state = self.lock();
        let mut failed = Vec::new();
        for (id, sub) in state.subscribers.iter_mut() {
            if let Some(ready_tx) = sub.ready_tx.take() {
                let _ = ready_tx.send(Err(TransportError::Unreachable(reason.to_string())));
                failed.push(*id);
            }
        }
        for id in &failed {
            state.subscribers.remove(id);
        }
        failed.len()
    }

    /// Delivers a message exactly as given, bypassing id and timestamp
    /// assignment. Used to simulate reordering, duplicates and pending echoes.
    pub fn inject(&self, room_id: &str, msg: ChatMessage) -> usize {
        let mut state = self.lock();
        state
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .push(msg.clone());
        state.fan_out(room_id, &msg)
    }

    pub fn history(&self, room_id: &str) -> Vec<ChatMessage> {
        self.lock().rooms.get(room_id).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.lock()
            .subscribers
            .values()
            .filter(|s| s.room_id == room_id)
            .count()
    }

    pub fn total_subscribers(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl RoomTransport for InMemoryRoomRelay {
    fn subscribe_room(&self, room_id: &str) -> Result<RoomSubscription, TransportError> {
        if room_id.trim().is_empty() {
            return Err(TransportError::InvalidRoom("room id is empty".to_string()));
        }
        let mut state = self.lock();
        if !state.reachable {
            return Err(TransportError::Unreachable("relay offline".to_string()));
        }

        let id = SubscriptionId(state.next_sub_id);
        state.next_sub_id = state.next_sub_id.wrapping_add(1);

        let (tx, rx) = flume::unbounded::<ChatMessage>();
        let (ready_tx, ready_rx) = flume::bounded::<Result<(), TransportError>>(1);

        for msg in state.rooms.get(room_id).into_iter().flatten() {
            let _ = tx.send(msg.clone());
        }

        let ready_tx = if state.defer_ready {
            Some(ready_tx)
        } else {
            let _ = ready_tx.send(Ok(()));
            None
        };
        state.subscribers.insert(
            id,
            Subscriber {
                room_id: room_id.to_string(),
                tx,
                ready_tx,
            },
        );
        tracing::debug!(room_id, subscription = %id, "room subscribed");

        let weak = Arc::downgrade(&self.state);
        let guard = SubscriptionGuard::new(id, move |id| {
            if let Some(state) = weak.upgrade() {
                let mut state = match state.lock() {
                    Ok(g) => g,
                    Err(poison) => poison.into_inner(),
                };
                state.subscribers.remove(&id);
            }
        });
        Ok(RoomSubscription::new(rx, ready_rx, guard))
    }

    fn append_message(
        &self,
        room_id: &str,
        author: &Author,
        text: &str,
    ) -> Result<(), TransportError> {
        if room_id.trim().is_empty() {
            return Err(TransportError::InvalidRoom("room id is empty".to_string()));
        }
        let mut state = self.lock();
        if !state.reachable {
            return Err(TransportError::Unreachable("relay offline".to_string()));
        }
        let msg = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            author_key: author.key.clone(),
            display_name: author.display_name.clone(),
            text: text.to_string(),
            timestamp: Some(state.next_timestamp()),
        };
        state
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .push(msg.clone());
        let delivered = state.fan_out(room_id, &msg);
        tracing::debug!(room_id, message_id = %msg.id, delivered, "message appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn author() -> Author {
        Author::new("ana@example.org", "Ana")
    }

    #[test]
    fn subscribe_replays_history_then_streams_appends() {
        let relay = InMemoryRoomRelay::new();
        relay
            .append_message("flood-7", &author(), "water rising")
            .unwrap();

        let sub = relay.subscribe_room("flood-7").expect("subscribe");
        sub.wait_ready(Duration::from_secs(1)).expect("ready");
        relay
            .append_message("flood-7", &author(), "need boats")
            .unwrap();

        let first = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.text, "water rising");
        assert_eq!(second.text, "need boats");
        assert!(first.timestamp.unwrap() < second.timestamp.unwrap());
    }

    #[test]
    fn appends_stay_in_their_room() {
        let relay = InMemoryRoomRelay::new();
        let a = relay.subscribe_room("a").unwrap();
        let b = relay.subscribe_room("b").unwrap();
        relay.append_message("a", &author(), "only a").unwrap();

        assert_eq!(a.recv_timeout(Duration::from_secs(1)).unwrap().text, "only a");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let relay = InMemoryRoomRelay::new();
        let sub = relay.subscribe_room("quake-1").unwrap();
        assert_eq!(relay.subscriber_count("quake-1"), 1);
        drop(sub);
        assert_eq!(relay.subscriber_count("quake-1"), 0);

        let sub = relay.subscribe_room("quake-1").unwrap();
        let (guard, rx, _ready) = sub.into_parts();
        guard.release();
        assert_eq!(relay.total_subscribers(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn deferred_ready_waits_for_release() {
        let relay = InMemoryRoomRelay::new();
        relay.set_defer_ready(true);
        let sub = relay.subscribe_room("fire-2").unwrap();
        assert!(sub.try_ready().is_none());
        assert_eq!(relay.release_ready(), 1);
        assert_eq!(sub.wait_ready(Duration::from_secs(1)), Ok(()));
    }

    #[test]
    fn unreachable_relay_rejects_subscribe_and_append() {
        let relay = InMemoryRoomRelay::new();
        relay.set_reachable(false);
        assert!(matches!(
            relay.subscribe_room("x"),
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            relay.append_message("x", &author(), "hi"),
            Err(TransportError::Unreachable(_))
        ));
        assert!(relay.history("x").is_empty());
    }

    #[test]
    fn fail_pending_drops_waiting_subscribers() {
        let relay = InMemoryRoomRelay::new();
        relay.set_defer_ready(true);
        let sub = relay.subscribe_room("storm").unwrap();
        assert_eq!(relay.fail_pending("boom"), 1);
        assert!(matches!(
            sub.wait_ready(Duration::from_secs(1)),
            Err(TransportError::Unreachable(_))
        ));
        assert_eq!(relay.subscriber_count("storm"), 0);
    }
}
