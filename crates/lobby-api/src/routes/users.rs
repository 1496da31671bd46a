use axum::{extract::State, Json};
use lobby_core::AppState;
use lobby_models::user::UserSummary;

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserSummary>, ApiError> {
    let user = lobby_db::users::get_user_by_id(&state.db, auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(lobby_core::conversation::user_summary(&user)))
}

/// Everyone except the caller, with live presence — the in-memory registry
/// overrides the persisted flag so a crashed session never shows online.
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let rows = lobby_db::users::list_users_except(&state.db, auth.user_id).await?;
    let users = rows
        .iter()
        .map(|row| {
            let mut summary = lobby_core::conversation::user_summary(row);
            summary.is_online = state.presence.is_online(row.id);
            summary
        })
        .collect();
    Ok(Json(users))
}
