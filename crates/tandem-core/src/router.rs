use crate::error::CoreError;
use crate::registry::SessionRegistry;
use crate::rooms::RoomMembership;
use crate::store::MessageStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tandem_models::gateway::ServerEvent;
use tandem_models::message::{MessageKind, ReactionEntry, StoredMessage};
use tandem_models::{MessageId, RoomId, UserId};

/// Fan-out hub. Durable messages are written to the store before any live
/// delivery; ephemeral events skip the store entirely. Delivery to an
/// offline member is dropped, never buffered — missed traffic is recovered
/// through [`replay_missed`](MessageRouter::replay_missed).
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomMembership>,
    store: Arc<dyn MessageStore>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomMembership>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            registry,
            rooms,
            store,
        }
    }

    /// Persist a durable message, then fan it out to every room member
    /// except the sender. A store failure aborts before anyone sees the
    /// message; the caller acks the sender with a rejection.
    pub async fn send_durable(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
        kind: MessageKind,
        attachments: &[String],
    ) -> Result<StoredMessage, CoreError> {
        if !kind.is_durable() {
            return Err(CoreError::BadRequest(format!(
                "kind '{}' cannot be sent by clients",
                kind.as_str()
            )));
        }

        let stored = self
            .store
            .append(room_id, sender_id, content, kind, attachments)
            .await?;

        let event = ServerEvent::RoomMessage {
            room_id,
            sender: sender_id,
            content: stored.content.clone(),
            kind: stored.kind,
            timestamp: stored.created_at,
            attachments: stored.attachments.clone(),
        };
        for member in self.rooms.members(room_id) {
            if member != sender_id {
                self.registry.send_to(member, event.clone());
            }
        }
        Ok(stored)
    }

    /// Server-synthesized presence notice. Delivered to everyone in the room
    /// except the subject; never persisted.
    pub fn broadcast_alarm(&self, room_id: RoomId, subject_id: UserId, content: String) {
        let event = ServerEvent::SystemAlarm {
            room_id,
            content,
            timestamp: Utc::now(),
        };
        for member in self.rooms.members(room_id) {
            if member != subject_id {
                self.registry.send_to(member, event.clone());
            }
        }
    }

    /// Typing indicator, fire and forget.
    pub fn broadcast_typing(&self, room_id: RoomId, from: UserId, started: bool) {
        let event = if started {
            ServerEvent::PartnerTyping { room_id }
        } else {
            ServerEvent::PartnerStopTyping { room_id }
        };
        for member in self.rooms.members(room_id) {
            if member != from {
                self.registry.send_to(member, event.clone());
            }
        }
    }

    /// Reaction aggregate state. Goes to every member, reactor included, so
    /// all clients converge on the same per-message state.
    pub fn broadcast_reactions(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        reactions: Vec<ReactionEntry>,
    ) {
        let event = ServerEvent::ReactionUpdate {
            room_id,
            message_id,
            reactions,
        };
        for member in self.rooms.members(room_id) {
            self.registry.send_to(member, event.clone());
        }
    }

    /// Replay everything the user missed since `last_seen`, as one batch,
    /// followed by the completion marker. Delivered only to the requester.
    pub async fn replay_missed(
        &self,
        room_id: RoomId,
        user_id: UserId,
        last_seen: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let events = self.store.query_after(room_id, last_seen).await?;
        self.registry
            .send_to(user_id, ServerEvent::MissedMessages { room_id, events });
        Ok(())
    }
}
