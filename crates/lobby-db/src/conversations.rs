use crate::users::UserRow;
use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

const CONVERSATION_COLUMNS: &str =
    "id, CASE WHEN is_group THEN 1 ELSE 0 END AS is_group, group_name, group_description, \
     admin_id, canonical_key, last_message_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub admin_id: Option<i64>,
    pub canonical_key: Option<String>,
    pub last_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ConversationRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            is_group: bool_from_any_row(row, "is_group")?,
            group_name: row.try_get("group_name")?,
            group_description: row.try_get("group_description")?,
            admin_id: row.try_get("admin_id")?,
            canonical_key: row.try_get("canonical_key")?,
            last_message_id: row.try_get("last_message_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

/// Sorted participant pair, the uniqueness key for direct conversations.
pub fn canonical_key(a: i64, b: i64) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

pub async fn find_direct_between(
    pool: &DbPool,
    user_a: i64,
    user_b: i64,
) -> Result<Option<ConversationRow>, DbError> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE canonical_key = $1"
    );
    let row = sqlx::query_as::<_, ConversationRow>(&sql)
        .bind(canonical_key(user_a, user_b))
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_direct(
    pool: &DbPool,
    id: i64,
    user_a: i64,
    user_b: i64,
) -> Result<ConversationRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO conversations (id, is_group, canonical_key, created_at, updated_at)
         VALUES ($1, 0, $2, $3, $3)",
    )
    .bind(id)
    .bind(canonical_key(user_a, user_b))
    .bind(&now)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        drop(tx);
        // Lost a creation race on the canonical key; the winner's row is the
        // conversation.
        if crate::is_unique_violation(&err) {
            if let Some(existing) = find_direct_between(pool, user_a, user_b).await? {
                return Ok(existing);
            }
        }
        return Err(DbError::Sqlx(err));
    }

    sqlx::query(
        "INSERT INTO conversation_participants (conversation_id, user_id)
         VALUES ($1, $2), ($1, $3)",
    )
    .bind(id)
    .bind(user_a)
    .bind(user_b)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    get_conversation(pool, id).await?.ok_or(DbError::NotFound)
}

pub async fn create_group(
    pool: &DbPool,
    id: i64,
    admin_id: i64,
    group_name: &str,
    group_description: Option<&str>,
    participant_ids: &[i64],
) -> Result<ConversationRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO conversations
             (id, is_group, group_name, group_description, admin_id, created_at, updated_at)
         VALUES ($1, 1, $2, $3, $4, $5, $5)",
    )
    .bind(id)
    .bind(group_name)
    .bind(group_description)
    .bind(admin_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for user_id in participant_ids {
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    get_conversation(pool, id).await?.ok_or(DbError::NotFound)
}

pub async fn get_conversation(
    pool: &DbPool,
    id: i64,
) -> Result<Option<ConversationRow>, DbError> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
    let row = sqlx::query_as::<_, ConversationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<ConversationRow>, DbError> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations c
         WHERE EXISTS (SELECT 1 FROM conversation_participants p
                       WHERE p.conversation_id = c.id AND p.user_id = $1)
         ORDER BY updated_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, ConversationRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn participants_of(
    pool: &DbPool,
    conversation_id: i64,
) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.username, u.display_name, u.email, u.password_hash, u.avatar_url,
                CASE WHEN u.is_online THEN 1 ELSE 0 END AS is_online, u.last_seen, u.created_at
         FROM users u
         INNER JOIN conversation_participants p ON p.user_id = u.id
         WHERE p.conversation_id = $1
         ORDER BY u.username",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn participant_ids(pool: &DbPool, conversation_id: i64) -> Result<Vec<i64>, DbError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn is_participant(
    pool: &DbPool,
    conversation_id: i64,
    user_id: i64,
) -> Result<bool, DbError> {
    let exists: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM conversation_participants
         WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(exists.is_some())
}

/// Users this user shares a direct conversation with. Feeds the
/// group-creation picker.
pub async fn chat_partner_ids(pool: &DbPool, user_id: i64) -> Result<Vec<i64>, DbError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT other.user_id
         FROM conversation_participants me
         INNER JOIN conversation_participants other
             ON other.conversation_id = me.conversation_id AND other.user_id != me.user_id
         INNER JOIN conversations c ON c.id = me.conversation_id AND c.is_group = 0
         WHERE me.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn delete_conversation(pool: &DbPool, id: i64) -> Result<(), DbError> {
    // Messages and participants cascade via foreign keys.
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
