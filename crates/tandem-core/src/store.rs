use crate::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tandem_db::DbPool;
use tandem_models::message::{MessageKind, StoredMessage};
use tandem_models::{MessageId, RoomId, UserId};

/// Upper bound on one replay batch.
pub const REPLAY_LIMIT: i64 = 500;

/// Durable message log. The router writes through this before any live
/// fan-out; the reconnection path reads replay batches from it.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
        kind: MessageKind,
        attachments: &[String],
    ) -> Result<StoredMessage, CoreError>;

    /// Messages authored strictly after `after`, oldest first, capped at
    /// [`REPLAY_LIMIT`].
    async fn query_after(
        &self,
        room_id: RoomId,
        after: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>, CoreError>;
}

pub struct SqlMessageStore {
    pool: DbPool,
    worker_id: u16,
}

impl SqlMessageStore {
    pub fn new(pool: DbPool, worker_id: u16) -> Self {
        Self { pool, worker_id }
    }
}

pub fn stored_from_row(row: tandem_db::messages::MessageRow) -> StoredMessage {
    StoredMessage {
        id: MessageId(row.id),
        room_id: RoomId(row.room_id),
        sender_id: UserId(row.sender_id),
        content: row.content,
        kind: row.kind,
        attachments: row.attachments,
        created_at: row.created_at,
    }
}

#[async_trait]
impl MessageStore for SqlMessageStore {
    async fn append(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
        kind: MessageKind,
        attachments: &[String],
    ) -> Result<StoredMessage, CoreError> {
        let id = tandem_util::snowflake::generate(self.worker_id);
        let row = tandem_db::messages::create_message(
            &self.pool,
            id,
            room_id.0,
            sender_id.0,
            content,
            kind,
            attachments,
        )
        .await?;
        Ok(stored_from_row(row))
    }

    async fn query_after(
        &self,
        room_id: RoomId,
        after: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>, CoreError> {
        let rows =
            tandem_db::messages::get_messages_after(&self.pool, room_id.0, after, REPLAY_LIMIT)
                .await?;
        Ok(rows.into_iter().map(stored_from_row).collect())
    }
}
