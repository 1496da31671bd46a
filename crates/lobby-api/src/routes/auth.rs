use axum::{extract::State, http::StatusCode, Json};
use lobby_core::AppState;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let username = body.username.trim().to_lowercase();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest("Invalid username".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ApiError::BadRequest(
            "Username may only contain letters, numbers, '_' and '.'".into(),
        ));
    }
    if body.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email".into()));
    }

    if lobby_db::users::get_user_by_username(&state.db, &username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    let password_hash = lobby_core::auth::hash_password(&body.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let user_id = lobby_util::snowflake::generate(1);
    let user = lobby_db::users::create_user(&state.db, user_id, &username, &email, &password_hash)
        .await
        .map_err(|e| match e {
            lobby_db::DbError::Sqlx(ref err) if lobby_db::is_unique_violation(err) => {
                ApiError::Conflict("Username or email already taken".into())
            }
            other => other.into(),
        })?;

    let token = lobby_core::auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user": lobby_core::conversation::user_summary(&user),
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let username = body.username.trim().to_lowercase();
    let user = lobby_db::users::get_user_by_username(&state.db, &username)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let ok = lobby_core::auth::verify_password(&body.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    if !ok {
        return Err(ApiError::Unauthorized);
    }

    let token = lobby_core::auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(json!({
        "token": token,
        "user": lobby_core::conversation::user_summary(&user),
    })))
}
