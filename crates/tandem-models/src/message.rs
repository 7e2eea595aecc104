use crate::{MessageId, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a message event.
///
/// `Text`, `Image` and `Video` are durable: they are persisted before any
/// live delivery. `Alarm` is synthesized server-side only and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Alarm,
}

impl MessageKind {
    /// Whether this kind must be written to the store before fan-out.
    pub fn is_durable(self) -> bool {
        matches!(self, Self::Text | Self::Image | Self::Video)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Alarm => "alarm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "alarm" => Some(Self::Alarm),
            _ => None,
        }
    }
}

/// A durably stored message, as returned by the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate reaction state of one message: one entry per reacting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEntry {
    pub user_id: UserId,
    pub emoji: String,
}
