use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

/// Message joined with its sender's display fields, for history responses.
#[derive(Debug, Clone)]
pub struct MessageWithSenderRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
    pub sender_display_name: Option<String>,
    pub sender_avatar_url: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageWithSenderRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            sender_username: row.try_get("sender_username")?,
            sender_display_name: row.try_get("sender_display_name")?,
            sender_avatar_url: row.try_get("sender_avatar_url")?,
        })
    }
}

/// Append a message and bump the conversation's denormalized last-message
/// pointer and updated_at. The append is the per-conversation serialization
/// point; the pointer update is last-write-wins by design.
pub async fn create_message(
    pool: &DbPool,
    id: i64,
    conversation_id: i64,
    sender_id: i64,
    content: &str,
) -> Result<MessageRow, DbError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, conversation_id, sender_id, content, created_at",
    )
    .bind(id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(content)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;

    sqlx::query("UPDATE conversations SET last_message_id = $1, updated_at = $2 WHERE id = $3")
        .bind(row.id)
        .bind(datetime_to_db_text(now))
        .bind(conversation_id)
        .execute(pool)
        .await?;

    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, conversation_id, sender_id, content, created_at
         FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Full ordered history for a conversation. Total order per conversation:
/// created_at, snowflake id as tiebreaker.
pub async fn list_for_conversation(
    pool: &DbPool,
    conversation_id: i64,
) -> Result<Vec<MessageWithSenderRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageWithSenderRow>(
        "SELECT m.id, m.conversation_id, m.sender_id, m.content, m.created_at,
                u.username AS sender_username,
                u.display_name AS sender_display_name,
                u.avatar_url AS sender_avatar_url
         FROM messages m
         INNER JOIN users u ON u.id = m.sender_id
         WHERE m.conversation_id = $1
         ORDER BY m.created_at ASC, m.id ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_for_conversation(pool: &DbPool, conversation_id: i64) -> Result<i64, DbError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
