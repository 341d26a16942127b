//! Room group payloads: joining, leaving and chat messages.

use std::collections::BTreeMap;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::RoomId;

const CHAT_ID: &str = "chatId";

/// `chat:join` / `chat:leave` body.
///
/// Encoded as `{chatId}`. A bare `chatId` text string decodes too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct RoomRef {
    /// Room whose group to enter or leave
    pub chat_id: RoomId,
}

/// Chat message, carried by both `message:send` and `message:received`.
///
/// Only `chatId` is interpreted by the relay. Every other field is kept
/// verbatim in `content` and re-emitted unchanged to the room group,
/// tagged values included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ChatMessage {
    /// Target room
    pub chat_id: RoomId,

    /// Client-defined fields (sender, text, attachments, ...)
    pub content: BTreeMap<String, Value>,
}

impl ChatMessage {
    /// Message with no client fields.
    pub fn new(chat_id: impl Into<RoomId>) -> Self {
        Self { chat_id: chat_id.into(), content: BTreeMap::new() }
    }

    /// Add a text field.
    #[must_use]
    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.content.insert(key.to_string(), Value::Text(value.to_string()));
        self
    }
}

impl TryFrom<Value> for RoomRef {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(chat_id) => Ok(Self { chat_id: RoomId::from(chat_id) }),
            Value::Map(entries) => {
                let chat_id = entries
                    .into_iter()
                    .find_map(|(key, value)| (key.as_text() == Some(CHAT_ID)).then_some(value))
                    .ok_or_else(|| format!("missing {CHAT_ID}"))?;
                Ok(Self { chat_id: room_id(chat_id)? })
            },
            _ => Err(format!("expected {CHAT_ID} or a map holding it")),
        }
    }
}

impl TryFrom<Value> for ChatMessage {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Map(entries) = value else {
            return Err("chat message must be a map".to_string());
        };

        let mut chat_id = None;
        let mut content = BTreeMap::new();
        for (key, value) in entries {
            let Value::Text(key) = key else {
                return Err("chat message keys must be text".to_string());
            };
            if key == CHAT_ID {
                if chat_id.replace(room_id(value)?).is_some() {
                    return Err(format!("duplicate {CHAT_ID}"));
                }
            } else {
                content.insert(key, value);
            }
        }

        let chat_id = chat_id.ok_or_else(|| format!("missing {CHAT_ID}"))?;
        Ok(Self { chat_id, content })
    }
}

impl From<ChatMessage> for Value {
    fn from(message: ChatMessage) -> Self {
        let chat_id = (Value::Text(CHAT_ID.to_string()), Value::Text(message.chat_id.to_string()));
        let fields = message.content.into_iter().map(|(key, value)| (Value::Text(key), value));
        Value::Map(std::iter::once(chat_id).chain(fields).collect())
    }
}

fn room_id(value: Value) -> Result<RoomId, String> {
    match value {
        Value::Text(id) => Ok(RoomId::from(id)),
        _ => Err(format!("{CHAT_ID} must be text")),
    }
}
