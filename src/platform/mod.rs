pub mod telegram;

use serde::Deserialize;

use crate::error::RelayError;

/// An inbound Telegram update, reduced to the shapes the relay acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A message carrying non-empty text.
    TextMessage(TextMessage),
    /// Anything else: edits, callbacks, stickers, service messages.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub chat_id: i64,
    /// Sender, when Telegram reports one (absent for channel posts).
    pub user_id: Option<i64>,
    pub text: String,
}

impl TextMessage {
    /// Key under which this sender's usage record lives.
    pub fn usage_key(&self) -> String {
        self.user_id.unwrap_or(self.chat_id).to_string()
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    message: Option<RawMessage>,
}

#[derive(Deserialize)]
struct RawMessage {
    chat: RawChat,
    from: Option<RawUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Deserialize)]
struct RawUser {
    id: i64,
}

impl Update {
    /// Parse a webhook body. Malformed JSON, or a message without a chat,
    /// is a [`RelayError::Parse`].
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let raw: RawUpdate = serde_json::from_slice(body)?;
        let update = match raw.message {
            Some(RawMessage {
                chat,
                from,
                text: Some(text),
            }) if !text.is_empty() => Update::TextMessage(TextMessage {
                chat_id: chat.id,
                user_id: from.map(|u| u.id),
                text,
            }),
            _ => Update::Other,
        };
        Ok(update)
    }
}
