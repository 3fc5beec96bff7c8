use serde::{Deserialize, Serialize};

/// Stable identity of whoever is typing into a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    /// Stable key (email in practice).
    pub key: String,
    pub display_name: String,
}

impl Author {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author_key: String,
    pub display_name: String,
    pub text: String,
    /// Unix milliseconds assigned by the transport. `None` while the transport
    /// has not confirmed the write yet.
    pub timestamp: Option<i64>,
}

impl ChatMessage {
    pub fn is_pending(&self) -> bool {
        self.timestamp.is_none()
    }

    pub fn is_authored_by(&self, author_key: &str) -> bool {
        self.author_key == author_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_messages_serialize_with_null_timestamp() {
        let msg = ChatMessage {
            id: "m1".into(),
            author_key: "ana@example.org".into(),
            display_name: "Ana".into(),
            text: "on my way".into(),
            timestamp: None,
        };
        assert!(msg.is_pending());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["timestamp"].is_null());
        assert!(msg.is_authored_by("ana@example.org"));
        assert!(!msg.is_authored_by("bo@example.org"));
    }
}
