use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

const USER_COLUMNS: &str =
    "id, username, display_name, email, password_hash, avatar_url, \
     CASE WHEN is_online THEN 1 ELSE 0 END AS is_online, last_seen, created_at";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let last_seen_raw: Option<String> = row.try_get("last_seen")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            avatar_url: row.try_get("avatar_url")?,
            is_online: bool_from_any_row(row, "is_online")?,
            last_seen: last_seen_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, DbError> {
    let sql = format!(
        "INSERT INTO users (id, username, email, password_hash)
         VALUES ($1, $2, $3, $4)
         RETURNING {USER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_user_by_username(
    pool: &DbPool,
    username: &str,
) -> Result<Option<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetch a set of users by id. Callers compare the returned length against the
/// requested length to detect unknown participants.
pub async fn get_users_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<UserRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut query = sqlx::query_as::<_, UserRow>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

pub async fn list_users_except(pool: &DbPool, user_id: i64) -> Result<Vec<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id != $1 ORDER BY username");
    let rows = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Persist the presence transition. Written only by the presence registry's
/// side effects and the shutdown sweep.
pub async fn set_presence(
    pool: &DbPool,
    user_id: i64,
    is_online: bool,
    last_seen: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET is_online = $1, last_seen = $2 WHERE id = $3")
        .bind(if is_online { 1_i64 } else { 0_i64 })
        .bind(datetime_to_db_text(last_seen))
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark every user offline. Used on graceful shutdown, when all in-memory
/// presence entries are about to be lost.
pub async fn mark_all_offline(pool: &DbPool, at: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("UPDATE users SET is_online = 0, last_seen = $1 WHERE is_online != 0")
        .bind(datetime_to_db_text(at))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn presence_round_trip() {
        let pool = test_pool().await;
        let user = create_user(&pool, 1, "ada", "ada@example.com", "hash")
            .await
            .expect("create");
        assert!(!user.is_online);
        assert!(user.last_seen.is_none());

        let at = chrono::Utc::now();
        set_presence(&pool, 1, true, at).await.expect("online");
        let user = get_user_by_id(&pool, 1).await.expect("get").expect("some");
        assert!(user.is_online);
        let seen = user.last_seen.expect("last_seen set");
        assert!((seen - at).num_seconds().abs() < 2);

        set_presence(&pool, 1, false, chrono::Utc::now())
            .await
            .expect("offline");
        let user = get_user_by_id(&pool, 1).await.expect("get").expect("some");
        assert!(!user.is_online);
    }

    #[tokio::test]
    async fn get_users_by_ids_detects_missing_participants() {
        let pool = test_pool().await;
        create_user(&pool, 1, "ada", "ada@example.com", "h")
            .await
            .unwrap();
        create_user(&pool, 2, "grace", "grace@example.com", "h")
            .await
            .unwrap();

        let found = get_users_by_ids(&pool, &[1, 2, 999]).await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
