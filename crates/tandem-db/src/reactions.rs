use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: i64,
    pub user_id: i64,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ReactionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            message_id: row.try_get("message_id")?,
            user_id: row.try_get("user_id")?,
            emoji: row.try_get("emoji")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

/// One reaction per (message, user); a second reaction replaces the first.
pub async fn upsert_reaction(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
    emoji: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO reactions (message_id, user_id, emoji, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (message_id, user_id)
         DO UPDATE SET emoji = excluded.emoji, created_at = excluded.created_at",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .bind(datetime_to_db_text(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_message_reactions(
    pool: &DbPool,
    message_id: i64,
) -> Result<Vec<ReactionRow>, DbError> {
    let rows = sqlx::query_as::<_, ReactionRow>(
        "SELECT message_id, user_id, emoji, created_at FROM reactions
         WHERE message_id = $1
         ORDER BY created_at ASC, user_id ASC",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
