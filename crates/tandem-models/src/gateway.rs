use crate::message::{MessageKind, ReactionEntry, StoredMessage};
use crate::{MessageId, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client -> server gateway events. One JSON text frame per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Login {
        user_id: UserId,
        user_name: String,
        #[serde(default)]
        is_reconnection: bool,
    },
    JoinRoom {
        room_id: RoomId,
        user_id: UserId,
        #[serde(default)]
        is_reconnection: bool,
    },
    RequestMissed {
        room_id: RoomId,
        user_id: UserId,
        last_seen: DateTime<Utc>,
    },
    SendMessage {
        room_id: RoomId,
        sender_id: UserId,
        content: String,
        kind: MessageKind,
        #[serde(default)]
        attachments: Vec<String>,
    },
    TypingStart {
        room_id: RoomId,
    },
    TypingStop {
        room_id: RoomId,
    },
    Logout,
}

/// Server -> client gateway events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomMessage {
        room_id: RoomId,
        sender: UserId,
        content: String,
        kind: MessageKind,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
    },
    SystemAlarm {
        room_id: RoomId,
        content: String,
        timestamp: DateTime<Utc>,
    },
    MissedMessages {
        room_id: RoomId,
        events: Vec<StoredMessage>,
    },
    ReconnectComplete {
        room_id: RoomId,
    },
    PartnerTyping {
        room_id: RoomId,
    },
    PartnerStopTyping {
        room_id: RoomId,
    },
    ReactionUpdate {
        room_id: RoomId,
        message_id: MessageId,
        reactions: Vec<ReactionEntry>,
    },
    /// Durable-write failure ack, delivered only to the sender.
    SendRejected {
        room_id: RoomId,
        reason: String,
    },
    /// A newer login for the same user took over this connection.
    Superseded,
    /// Rejected inbound event (bad room, identity mismatch, malformed kind).
    Error {
        context: String,
        message: String,
    },
}
