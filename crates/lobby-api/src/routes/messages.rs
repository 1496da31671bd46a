use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lobby_core::AppState;
use lobby_models::message::MessageView;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::routes::parse_id;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub content: String,
}

/// Durable write. The stored message comes back to the sender, who relays it
/// over the gateway for live fan-out; nothing is broadcast from here.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let conversation_id = parse_id(&body.conversation_id, "conversation_id")?;
    let message =
        lobby_core::message::send(&state.db, auth.user_id, conversation_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let conversation_id = parse_id(&conversation_id, "conversation id")?;
    let messages =
        lobby_core::message::history(&state.db, auth.user_id, conversation_id).await?;
    Ok(Json(messages))
}
