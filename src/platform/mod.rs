pub mod jsonl;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a chat message as assigned by the room.
///
/// The feed sends ids either as JSON strings or JSON numbers; both are kept
/// in their textual form so that equality survives a round trip through the
/// cursor file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => MessageId(text),
            RawId::Number(number) => MessageId(number.to_string()),
        })
    }
}

/// A message received from the chat room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Stable identifier of the sender (a wallet address on the room's platform)
    #[serde(alias = "userAddress")]
    pub user_id: String,
    /// Display name, possibly a full wallet address
    pub username: String,
    #[serde(alias = "message")]
    pub text: String,
    /// Informational only; never used for ordering
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accept an RFC 3339 string or epoch milliseconds. Anything else becomes
/// `None` instead of rejecting the message.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(serde_json::Value::Number(millis)) => {
            millis.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis)
        }
        _ => None,
    })
}

/// One delivery from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// History delivered once on connect, newest message first
    Backlog(Vec<ChatMessage>),
    /// A single message pushed live
    Live(ChatMessage),
}

impl FeedEvent {
    /// Split into the messages and whether they are ordered newest-first.
    pub fn into_batch(self) -> (Vec<ChatMessage>, bool) {
        match self {
            FeedEvent::Backlog(messages) => (messages, true),
            FeedEvent::Live(message) => (vec![message], true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_accepts_string_and_number() {
        let text: MessageId = serde_json::from_str(r#""42""#).unwrap();
        let number: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(text, number);
        assert_eq!(number.as_str(), "42");
    }

    #[test]
    fn test_chat_message_accepts_feed_field_names() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{
                "id": "abc-1",
                "userAddress": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
                "username": "alice",
                "message": "/addtopic rust",
                "timestamp": "2026-01-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(msg.id, MessageId::from("abc-1"));
        assert_eq!(msg.user_id, "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");
        assert_eq!(msg.text, "/addtopic rust");
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn test_timestamp_is_optional() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"id": 7, "user_id": "u1", "username": "bob", "text": "hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.id.as_str(), "7");
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_timestamp_accepts_epoch_millis_and_ignores_junk() {
        let millis: ChatMessage = serde_json::from_str(
            r#"{"id": "1", "user_id": "u1", "username": "bob", "text": "hi", "timestamp": 1700000000000}"#,
        )
        .unwrap();
        assert_eq!(millis.timestamp.unwrap().timestamp(), 1_700_000_000);

        for junk in [r#""yesterday""#, "true", "null", "[1]"] {
            let json = format!(
                r#"{{"id": "1", "user_id": "u1", "username": "bob", "text": "hi", "timestamp": {}}}"#,
                junk
            );
            let msg: ChatMessage = serde_json::from_str(&json).unwrap();
            assert!(msg.timestamp.is_none(), "timestamp: {}", junk);
        }
    }

    #[test]
    fn test_live_event_is_single_message_batch() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"id": "1", "user_id": "u1", "username": "bob", "text": "hi"}"#,
        )
        .unwrap();
        let (batch, newest_first) = FeedEvent::Live(msg.clone()).into_batch();
        assert_eq!(batch, vec![msg]);
        assert!(newest_first);
    }
}
