//! Durable message phase. A send here only persists; live fan-out happens
//! when the sender's gateway session relays the stored message to the room.

use lobby_db::messages::{self, MessageWithSenderRow};
use lobby_db::DbPool;
use lobby_models::message::MessageView;
use lobby_models::user::UserSummary;

use crate::conversation::ensure_participant;
use crate::error::CoreError;

pub const MAX_CONTENT_LEN: usize = 4000;

/// Persist a message from `sender_id` into a conversation they belong to.
/// A rejected send leaves no row behind.
pub async fn send(
    db: &DbPool,
    sender_id: i64,
    conversation_id: i64,
    content: &str,
) -> Result<MessageView, CoreError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CoreError::InvalidRequest("message content is required".into()));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(CoreError::InvalidRequest("message content too long".into()));
    }

    ensure_participant(db, conversation_id, sender_id).await?;

    let sender = lobby_db::users::get_user_by_id(db, sender_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    let id = lobby_util::snowflake::generate(1);
    let row = messages::create_message(db, id, conversation_id, sender_id, content).await?;

    Ok(MessageView {
        id: row.id.to_string(),
        conversation_id: row.conversation_id.to_string(),
        sender: crate::conversation::user_summary(&sender),
        content: row.content,
        created_at: row.created_at,
    })
}

/// Full ordered history of a conversation the caller participates in.
pub async fn history(
    db: &DbPool,
    user_id: i64,
    conversation_id: i64,
) -> Result<Vec<MessageView>, CoreError> {
    ensure_participant(db, conversation_id, user_id).await?;
    let rows = messages::list_for_conversation(db, conversation_id).await?;
    Ok(rows.into_iter().map(view_from_row).collect())
}

fn view_from_row(row: MessageWithSenderRow) -> MessageView {
    MessageView {
        id: row.id.to_string(),
        conversation_id: row.conversation_id.to_string(),
        sender: UserSummary {
            id: row.sender_id.to_string(),
            username: row.sender_username,
            display_name: row.sender_display_name,
            avatar_url: row.sender_avatar_url,
            // History rows carry identity, not liveness; presence rides the
            // status broadcast instead.
            is_online: false,
            last_seen: None,
        },
        content: row.content,
        created_at: row.created_at,
    }
}
