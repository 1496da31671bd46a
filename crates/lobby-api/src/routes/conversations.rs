use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lobby_core::AppState;
use lobby_models::conversation::ConversationView;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::routes::parse_id;

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub participant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub group_name: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub group_description: Option<String>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationView>>, ApiError> {
    let views = lobby_core::conversation::list_for_user(&state.db, auth.user_id).await?;
    Ok(Json(views))
}

/// Create (or fetch) the direct conversation with another user. Re-posting
/// the same pair, in either direction, returns the existing conversation.
pub async fn create_direct(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateDirectRequest>,
) -> Result<(StatusCode, Json<ConversationView>), ApiError> {
    let participant_id = parse_id(&body.participant_id, "participant_id")?;
    let (row, created) =
        lobby_core::conversation::create_direct(&state.db, auth.user_id, participant_id).await?;
    let view = lobby_core::conversation::get_for_user(&state.db, auth.user_id, row.id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view)))
}

pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ConversationView>), ApiError> {
    let mut participant_ids = Vec::with_capacity(body.participants.len());
    for raw in &body.participants {
        participant_ids.push(parse_id(raw, "participant id")?);
    }

    let row = lobby_core::conversation::create_group(
        &state.db,
        auth.user_id,
        &body.group_name,
        &participant_ids,
        body.group_description.as_deref(),
    )
    .await?;
    let view = lobby_core::conversation::get_for_user(&state.db, auth.user_id, row.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation id")?;
    let view =
        lobby_core::conversation::get_for_user(&state.db, auth.user_id, conversation_id).await?;
    Ok(Json(view))
}

/// Admin-only group deletion. This is the durable phase; the admin's client
/// follows up with a `group_deleted` gateway event to tear the room down.
pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation id")?;
    let deleted =
        lobby_core::conversation::delete_group(&state.db, &state.rooms, auth.user_id, conversation_id)
            .await?;
    Ok(Json(json!({
        "id": deleted.id.to_string(),
        "group_name": deleted.group_name,
        "deleted": true,
    })))
}

/// Users the caller already chats with, plus the full roster for starting
/// new conversations.
pub async fn chat_partners(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let (partners, everyone) =
        lobby_core::conversation::chat_partners(&state.db, auth.user_id).await?;
    Ok(Json(json!({
        "partners": partners,
        "users": everyone,
    })))
}
