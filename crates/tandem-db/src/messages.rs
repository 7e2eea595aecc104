use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tandem_models::message::MessageKind;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let kind_raw: String = row.try_get("kind")?;
        let attachments_raw: String = row.try_get("attachments")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            kind: MessageKind::parse(&kind_raw).ok_or_else(|| {
                sqlx::Error::Protocol(format!("invalid message kind '{kind_raw}'"))
            })?,
            attachments: serde_json::from_str(&attachments_raw)
                .map_err(|e| sqlx::Error::Protocol(format!("invalid attachments json: {e}")))?,
            is_read: bool_from_any_row(row, "is_read")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, room_id, sender_id, content, kind, attachments, is_read, created_at";

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: &str,
    kind: MessageKind,
    attachments: &[String],
) -> Result<MessageRow, DbError> {
    let attachments_json = serde_json::to_string(attachments)
        .map_err(|e| DbError::Sqlx(sqlx::Error::Protocol(e.to_string())))?;
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, room_id, sender_id, content, kind, attachments, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id, room_id, sender_id, content, kind, attachments, is_read, created_at",
    )
    .bind(id)
    .bind(room_id)
    .bind(sender_id)
    .bind(content)
    .bind(kind.as_str())
    .bind(attachments_json)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Full room history, chronological.
pub async fn get_room_messages(pool: &DbPool, room_id: i64) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE room_id = $1
         ORDER BY created_at ASC, id ASC"
    ))
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Messages authored strictly after `after`, chronological. Replay source.
pub async fn get_messages_after(
    pool: &DbPool,
    room_id: i64,
    after: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE room_id = $1 AND created_at > $2
         ORDER BY created_at ASC, id ASC
         LIMIT $3"
    ))
    .bind(room_id)
    .bind(datetime_to_db_text(after))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_last_message(pool: &DbPool, room_id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE room_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(room_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Unread messages addressed to `user_id` (everything in the room it did not
/// send itself).
pub async fn count_unread(pool: &DbPool, room_id: i64, user_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages
         WHERE room_id = $1 AND sender_id <> $2 AND is_read = 0",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn mark_read(pool: &DbPool, room_id: i64, user_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE messages SET is_read = 1
         WHERE room_id = $1 AND sender_id <> $2 AND is_read = 0",
    )
    .bind(room_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
