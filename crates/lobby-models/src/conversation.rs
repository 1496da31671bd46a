use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: String,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_description: Option<String>,
    /// The group admin; absent for direct conversations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<UserSummary>,
    pub participants: Vec<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessageView>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized last-message detail for conversation list views.
/// Display hint only; the history fetch is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageView {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
