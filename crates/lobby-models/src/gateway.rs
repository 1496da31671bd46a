use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One typed variant per named client event; unknown or malformed payloads
/// fail deserialization at the boundary and never reach dispatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Completes session setup; the session joins its personal channel and
    /// is marked online.
    #[serde(rename = "setup")]
    Setup { id: String, user_name: String },
    #[serde(rename = "enterroom")]
    EnterRoom { room_id: String },
    #[serde(rename = "leaveroom")]
    LeaveRoom { room_id: String },
    /// Broadcast phase of message delivery: the message named here has
    /// already been persisted via `POST /api/messages`.
    #[serde(rename = "new_message")]
    NewMessage {
        conversation_id: String,
        message_id: String,
        message: String,
        sender: String,
        sender_name: String,
        #[serde(default)]
        pic: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "typing")]
    Typing {
        conversation_id: String,
        sender: String,
        sender_name: String,
    },
    #[serde(rename = "typingStop")]
    TypingStop {
        conversation_id: String,
        sender: String,
        sender_name: String,
    },
    #[serde(rename = "group_created")]
    GroupCreated {
        group_id: String,
        participants: Vec<String>,
        group_name: String,
        creator_name: String,
    },
    #[serde(rename = "group_deleted")]
    GroupDeleted {
        group_id: String,
        participants: Vec<String>,
        group_name: String,
        admin_name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// Setup acknowledgment.
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        message_id: String,
        conversation_id: String,
        sender: String,
        sender_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pic: Option<String>,
        text: String,
        timestamp: DateTime<Utc>,
        is_group: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
        sender_info: SenderInfo,
    },
    #[serde(rename = "typing")]
    Typing {
        conversation_id: String,
        sender: String,
        sender_name: String,
    },
    #[serde(rename = "typingStop")]
    TypingStop {
        conversation_id: String,
        sender: String,
        sender_name: String,
    },
    #[serde(rename = "userStatusUpdate")]
    UserStatusUpdate { user_id: String, is_online: bool },
    #[serde(rename = "group_invitation")]
    GroupInvitation {
        group_id: String,
        group_name: String,
        creator_name: String,
        message: String,
    },
    #[serde(rename = "group_deleted")]
    GroupDeleted {
        group_id: String,
        group_name: String,
        admin_name: String,
        message: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
