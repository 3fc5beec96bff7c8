use beacon_relay::{Author, RoomTransport, TransportError};

use crate::room::RoomSession;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("room {requested} is not the open room (open: {open:?})")]
    StaleRoom {
        requested: String,
        open: Option<String>,
    },
    #[error("append failed: {0}")]
    Transport(#[from] TransportError),
}

/// Outgoing side of a room.
///
/// Holds the draft being typed. A send that reaches the transport clears the
/// draft straight away; nothing is inserted into the feed until the
/// subscription echoes the message back.
#[derive(Debug, Default)]
pub struct MessageComposer {
    draft: String,
}

impl MessageComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    pub fn send(
        &mut self,
        session: &RoomSession,
        transport: &dyn RoomTransport,
        room_id: &str,
        author: &Author,
        text: &str,
    ) -> Result<(), ComposeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyMessage);
        }
        if session.open_room() != Some(room_id) {
            return Err(ComposeError::StaleRoom {
                requested: room_id.to_string(),
                open: session.open_room().map(str::to_string),
            });
        }
        transport.append_message(room_id, author, text)?;
        tracing::debug!(room_id, chars = text.chars().count(), "message handed to transport");
        self.draft.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use beacon_relay::{InMemoryRoomRelay, RoomSubscription};

    use super::*;

    /// Transport that records appends and delegates subscriptions.
    #[derive(Default)]
    struct CountingTransport {
        relay: InMemoryRoomRelay,
        appends: Mutex<Vec<(String, String)>>,
    }

    impl RoomTransport for CountingTransport {
        fn subscribe_room(&self, room_id: &str) -> Result<RoomSubscription, TransportError> {
            self.relay.subscribe_room(room_id)
        }

        fn append_message(
            &self,
            room_id: &str,
            author: &Author,
            text: &str,
        ) -> Result<(), TransportError> {
            self.appends
                .lock()
                .unwrap()
                .push((room_id.to_string(), text.to_string()));
            self.relay.append_message(room_id, author, text)
        }
    }

    fn author() -> Author {
        Author::new("ana@example.org", "Ana")
    }

    #[test]
    fn send_to_open_room_appends_and_clears_draft() {
        let transport = CountingTransport::default();
        let mut session = RoomSession::new();
        session.open(&transport, "x").unwrap();

        let mut composer = MessageComposer::new();
        composer.set_draft("  help  ");
        composer
            .send(&session, &transport, "x", &author(), "  help  ")
            .unwrap();
        assert_eq!(composer.draft(), "");
        assert_eq!(
            *transport.appends.lock().unwrap(),
            vec![("x".to_string(), "help".to_string())]
        );
        // No optimistic insert.
        assert!(session.feed().is_empty());
    }

    #[test]
    fn send_to_other_room_is_stale_and_never_appends() {
        let transport = CountingTransport::default();
        let mut session = RoomSession::new();
        session.open(&transport, "x").unwrap();

        let mut composer = MessageComposer::new();
        composer.set_draft("help");
        let err = composer
            .send(&session, &transport, "y", &author(), "help")
            .unwrap_err();
        assert_eq!(
            err,
            ComposeError::StaleRoom {
                requested: "y".into(),
                open: Some("x".into()),
            }
        );
        assert!(transport.appends.lock().unwrap().is_empty());
        assert_eq!(composer.draft(), "help");
    }

    #[test]
    fn send_while_closed_or_opening_is_stale() {
        let transport = CountingTransport::default();
        let mut session = RoomSession::new();
        let mut composer = MessageComposer::new();
        assert!(matches!(
            composer.send(&session, &transport, "x", &author(), "hi"),
            Err(ComposeError::StaleRoom { open: None, .. })
        ));

        transport.relay.set_defer_ready(true);
        session.open(&transport, "x").unwrap();
        assert!(matches!(
            composer.send(&session, &transport, "x", &author(), "hi"),
            Err(ComposeError::StaleRoom { .. })
        ));
        assert!(transport.appends.lock().unwrap().is_empty());
    }

    #[test]
    fn blank_text_is_rejected_before_room_check() {
        let transport = CountingTransport::default();
        let session = RoomSession::new();
        let mut composer = MessageComposer::new();
        assert_eq!(
            composer.send(&session, &transport, "x", &author(), " \n\t "),
            Err(ComposeError::EmptyMessage)
        );
    }

    #[test]
    fn transport_failure_keeps_the_draft() {
        let transport = CountingTransport::default();
        let mut session = RoomSession::new();
        session.open(&transport, "x").unwrap();
        transport.relay.set_reachable(false);

        let mut composer = MessageComposer::new();
        composer.set_draft("help");
        let err = composer
            .send(&session, &transport, "x", &author(), "help")
            .unwrap_err();
        assert!(matches!(err, ComposeError::Transport(TransportError::Unreachable(_))));
        assert_eq!(composer.draft(), "help");
    }
}
