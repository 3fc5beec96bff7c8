use std::cmp::Ordering;

use crate::ChatMessage;

/// Sort order of the feed: confirmed timestamps ascending, pending messages
/// after every confirmed one, ties broken by message id.
pub fn feed_order(a: &ChatMessage, b: &ChatMessage) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Ordered messages of the currently open room.
///
/// Arrival order is irrelevant: every append lands in its sorted position.
#[derive(Debug, Clone, Default)]
pub struct MessageFeed {
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A pending copy was replaced by its confirmed echo.
    Confirmed,
    Duplicate,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, msg: ChatMessage) -> AppendOutcome {
        if let Some(pos) = self.messages.iter().position(|m| m.id == msg.id) {
            if self.messages[pos].is_pending() && !msg.is_pending() {
                self.messages.remove(pos);
                self.insert_sorted(msg);
                return AppendOutcome::Confirmed;
            }
            return AppendOutcome::Duplicate;
        }
        self.insert_sorted(msg);
        AppendOutcome::Inserted
    }

    fn insert_sorted(&mut self, msg: ChatMessage) {
        let idx = self
            .messages
            .partition_point(|m| feed_order(m, &msg) == Ordering::Less);
        self.messages.insert(idx, msg);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Owned copy for observers; always the full ordering.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, ts: Option<i64>) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            author_key: "ana@example.org".into(),
            display_name: "Ana".into(),
            text: format!("text {id}"),
            timestamp: ts,
        }
    }

    fn ids(feed: &MessageFeed) -> Vec<&str> {
        feed.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn out_of_order_arrivals_are_sorted() {
        let mut feed = MessageFeed::new();
        feed.append(msg("m3", Some(3)));
        feed.append(msg("m1", Some(1)));
        feed.append(msg("m2", Some(2)));
        assert_eq!(ids(&feed), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_timestamps_order_by_id() {
        let mut feed = MessageFeed::new();
        feed.append(msg("b", Some(5)));
        feed.append(msg("c", Some(5)));
        feed.append(msg("a", Some(5)));
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);
    }

    #[test]
    fn pending_sorts_last_until_confirmed() {
        let mut feed = MessageFeed::new();
        feed.append(msg("p", None));
        feed.append(msg("x", Some(10)));
        assert_eq!(ids(&feed), vec!["x", "p"]);

        assert_eq!(feed.append(msg("p", Some(5))), AppendOutcome::Confirmed);
        assert_eq!(ids(&feed), vec!["p", "x"]);
        assert_eq!(feed.messages()[0].timestamp, Some(5));
    }

    #[test]
    fn redelivery_is_ignored() {
        let mut feed = MessageFeed::new();
        assert_eq!(feed.append(msg("m", Some(1))), AppendOutcome::Inserted);
        assert_eq!(feed.append(msg("m", Some(1))), AppendOutcome::Duplicate);
        assert_eq!(feed.append(msg("m", None)), AppendOutcome::Duplicate);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let mut feed = MessageFeed::new();
        feed.append(msg("a", Some(1)));
        let snap = feed.snapshot();
        feed.clear();
        assert_eq!(snap.len(), 1);
        assert!(feed.is_empty());
    }
}
