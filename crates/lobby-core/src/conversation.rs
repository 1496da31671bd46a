//! Conversation lifecycle: canonical direct pairs, group creation and
//! admin-only deletion, participant-scoped reads.

use lobby_db::conversations::{self, ConversationRow};
use lobby_db::users::{self, UserRow};
use lobby_db::DbPool;
use lobby_models::conversation::{ConversationView, LastMessageView};
use lobby_models::user::UserSummary;

use crate::error::CoreError;
use crate::events::EventBus;
use crate::rooms::RoomRouter;

pub fn user_summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: user.id.to_string(),
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
        is_online: user.is_online,
        last_seen: user.last_seen,
    }
}

/// Load a conversation and require the caller to be a participant.
pub async fn ensure_participant(
    db: &DbPool,
    conversation_id: i64,
    user_id: i64,
) -> Result<ConversationRow, CoreError> {
    let conversation = conversations::get_conversation(db, conversation_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !conversations::is_participant(db, conversation_id, user_id).await? {
        return Err(CoreError::Forbidden);
    }
    Ok(conversation)
}

/// Create or return the direct conversation between two users. The pair is
/// canonicalized (sorted) before lookup so A->B and B->A resolve to one
/// conversation.
pub async fn create_direct(
    db: &DbPool,
    me: i64,
    participant_id: i64,
) -> Result<(ConversationRow, bool), CoreError> {
    if participant_id == me {
        return Err(CoreError::InvalidRequest(
            "cannot start a conversation with yourself".into(),
        ));
    }
    users::get_user_by_id(db, participant_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if let Some(existing) = conversations::find_direct_between(db, me, participant_id).await? {
        return Ok((existing, false));
    }

    let id = lobby_util::snowflake::generate(1);
    let row = conversations::create_direct(db, id, me, participant_id).await?;
    // create_direct resolves canonical-key races to the winner's row.
    let created = row.id == id;
    Ok((row, created))
}

/// Create a group conversation. The creator becomes admin and is always a
/// participant; at least two others are required.
pub async fn create_group(
    db: &DbPool,
    me: i64,
    group_name: &str,
    participant_ids: &[i64],
    group_description: Option<&str>,
) -> Result<ConversationRow, CoreError> {
    let group_name = group_name.trim();
    if group_name.is_empty() {
        return Err(CoreError::InvalidRequest("group name is required".into()));
    }

    let mut all_participants: Vec<i64> = vec![me];
    for &id in participant_ids {
        if !all_participants.contains(&id) {
            all_participants.push(id);
        }
    }
    if all_participants.len() < 3 {
        return Err(CoreError::InvalidRequest(
            "a group needs at least 2 other participants".into(),
        ));
    }

    let found = users::get_users_by_ids(db, &all_participants).await?;
    if found.len() != all_participants.len() {
        return Err(CoreError::InvalidRequest(
            "one or more participants not found".into(),
        ));
    }

    let id = lobby_util::snowflake::generate(1);
    let row =
        conversations::create_group(db, id, me, group_name, group_description, &all_participants)
            .await?;
    Ok(row)
}

/// Delete a group: admin-only, group-only. Durable removal happens here; the
/// room-teardown notices ride the broadcast phase (the admin's client emits
/// `group_deleted` after this returns). The router entry is cleared eagerly
/// so a dead room can't accumulate members.
pub async fn delete_group(
    db: &DbPool,
    rooms: &RoomRouter,
    me: i64,
    conversation_id: i64,
) -> Result<ConversationRow, CoreError> {
    let conversation = conversations::get_conversation(db, conversation_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !conversation.is_group {
        return Err(CoreError::InvalidRequest(
            "not a group conversation".into(),
        ));
    }
    if conversation.admin_id != Some(me) {
        return Err(CoreError::Forbidden);
    }

    conversations::delete_conversation(db, conversation_id).await?;
    rooms.evict_all(conversation_id);
    Ok(conversation)
}

pub async fn get_for_user(
    db: &DbPool,
    me: i64,
    conversation_id: i64,
) -> Result<ConversationView, CoreError> {
    let row = ensure_participant(db, conversation_id, me).await?;
    build_view(db, &row).await
}

/// All of the caller's conversations, most recently active first, with
/// participant and last-message detail populated for list views.
pub async fn list_for_user(db: &DbPool, me: i64) -> Result<Vec<ConversationView>, CoreError> {
    let rows = conversations::list_for_user(db, me).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(build_view(db, row).await?);
    }
    Ok(views)
}

/// Users the caller has direct conversations with, plus everyone else.
/// Feeds the group-creation picker.
pub async fn chat_partners(
    db: &DbPool,
    me: i64,
) -> Result<(Vec<UserSummary>, Vec<UserSummary>), CoreError> {
    let partner_ids = conversations::chat_partner_ids(db, me).await?;
    let partners = users::get_users_by_ids(db, &partner_ids).await?;
    let everyone = users::list_users_except(db, me).await?;
    Ok((
        partners.iter().map(user_summary).collect(),
        everyone.iter().map(user_summary).collect(),
    ))
}

async fn build_view(db: &DbPool, row: &ConversationRow) -> Result<ConversationView, CoreError> {
    let participants = conversations::participants_of(db, row.id).await?;

    let admin = match row.admin_id {
        Some(admin_id) => participants
            .iter()
            .find(|u| u.id == admin_id)
            .map(user_summary),
        None => None,
    };

    let last_message = match row.last_message_id {
        Some(message_id) => lobby_db::messages::get_message(db, message_id)
            .await?
            .map(|m| LastMessageView {
                id: m.id.to_string(),
                sender_id: m.sender_id.to_string(),
                content: m.content,
                created_at: m.created_at,
            }),
        None => None,
    };

    Ok(ConversationView {
        id: row.id.to_string(),
        is_group: row.is_group,
        group_name: row.group_name.clone(),
        group_description: row.group_description.clone(),
        admin,
        participants: participants.iter().map(user_summary).collect(),
        last_message,
        updated_at: row.updated_at,
    })
}

/// Build the personal-channel invitation notices for a freshly created group.
/// The creator is excluded; they already have the group from the REST
/// response.
pub fn notify_group_created(
    bus: &EventBus,
    creator_id: i64,
    group_id: i64,
    group_name: &str,
    creator_name: &str,
    participant_ids: &[i64],
) {
    let recipients: Vec<i64> = participant_ids
        .iter()
        .copied()
        .filter(|&id| id != creator_id)
        .collect();
    if recipients.is_empty() {
        return;
    }
    bus.dispatch_to_users(
        lobby_models::gateway::OutboundEvent::GroupInvitation {
            group_id: group_id.to_string(),
            group_name: group_name.to_string(),
            creator_name: creator_name.to_string(),
            message: format!(
                "You've been added to the group \"{group_name}\" by {creator_name}"
            ),
        },
        recipients,
    );
}

/// Personal-channel deletion notices plus the forced room leave for every
/// session still inside the room. Each member receives exactly one
/// `group_deleted` payload; the forced leave is an eviction marker on the
/// same event, so sessions clear the room silently like the original's
/// server-side socket eviction.
pub fn notify_group_deleted(
    bus: &EventBus,
    rooms: &RoomRouter,
    admin_id: i64,
    group_id: i64,
    group_name: &str,
    admin_name: &str,
    participant_ids: &[i64],
) {
    let recipients: Vec<i64> = participant_ids
        .iter()
        .copied()
        .filter(|&id| id != admin_id)
        .collect();
    rooms.evict_all(group_id);
    bus.publish(crate::events::ServerEvent {
        event: lobby_models::gateway::OutboundEvent::GroupDeleted {
            group_id: group_id.to_string(),
            group_name: group_name.to_string(),
            admin_name: admin_name.to_string(),
            message: format!("The group \"{group_name}\" has been deleted by {admin_name}"),
        },
        room_id: None,
        target_user_ids: Some(recipients),
        except_user_id: None,
        evict_room_id: Some(group_id),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> DbPool {
        let pool = lobby_db::create_pool("sqlite::memory:", 1).await.unwrap();
        lobby_db::run_migrations(&pool).await.unwrap();
        for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger"), (4, "barbara")] {
            users::create_user(&pool, id, name, &format!("{name}@example.com"), "h")
                .await
                .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn direct_creation_is_canonical_both_directions() {
        let pool = seeded().await;
        let (first, created) = create_direct(&pool, 1, 2).await.unwrap();
        assert!(created);
        let (second, created) = create_direct(&pool, 2, 1).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn direct_with_self_or_stranger_fails() {
        let pool = seeded().await;
        assert!(matches!(
            create_direct(&pool, 1, 1).await,
            Err(CoreError::InvalidRequest(_))
        ));
        assert!(matches!(
            create_direct(&pool, 1, 999).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn group_requires_three_total_participants() {
        let pool = seeded().await;
        // Creator + one other (with a duplicate) is not enough.
        let err = create_group(&pool, 1, "Squad", &[2, 2], None).await;
        assert!(matches!(err, Err(CoreError::InvalidRequest(_))));

        let group = create_group(&pool, 1, "Squad", &[2, 3], Some("scrims"))
            .await
            .unwrap();
        assert!(group.is_group);
        assert_eq!(group.admin_id, Some(1));
    }

    #[tokio::test]
    async fn group_delete_is_admin_only() {
        let pool = seeded().await;
        let rooms = RoomRouter::new();
        let group = create_group(&pool, 1, "Squad", &[2, 3], None).await.unwrap();

        assert!(matches!(
            delete_group(&pool, &rooms, 2, group.id).await,
            Err(CoreError::Forbidden)
        ));

        rooms.join(group.id, "sess-b");
        delete_group(&pool, &rooms, 1, group.id).await.unwrap();
        assert!(rooms.members(group.id).is_empty());
        assert!(
            lobby_db::conversations::get_conversation(&pool, group.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_rejects_direct_conversations() {
        let pool = seeded().await;
        let rooms = RoomRouter::new();
        let (direct, _) = create_direct(&pool, 1, 2).await.unwrap();
        assert!(matches!(
            delete_group(&pool, &rooms, 1, direct.id).await,
            Err(CoreError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn invitations_exclude_the_creator() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        notify_group_created(&bus, 1, 500, "Squad", "ada", &[1, 2, 3]);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.target_user_ids, Some(vec![2, 3]));
    }

    #[tokio::test]
    async fn deletion_notice_is_personal_channel_only() {
        let bus = EventBus::new(16);
        let rooms = RoomRouter::new();
        rooms.join(500, "sess-b");
        let mut rx = bus.subscribe();

        notify_group_deleted(&bus, &rooms, 1, 500, "Squad", "ada", &[1, 2, 3]);

        // One targeted notice per member; the forced leave rides the same
        // event as an eviction marker instead of a second payload.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.target_user_ids, Some(vec![2, 3]));
        assert_eq!(event.room_id, None);
        assert_eq!(event.evict_room_id, Some(500));
        assert!(rx.try_recv().is_err());
        assert!(rooms.members(500).is_empty());
    }

    #[tokio::test]
    async fn list_view_populates_detail() {
        let pool = seeded().await;
        let (direct, _) = create_direct(&pool, 1, 2).await.unwrap();
        lobby_db::messages::create_message(&pool, 900, direct.id, 2, "gg")
            .await
            .unwrap();

        let views = list_for_user(&pool, 1).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].participants.len(), 2);
        assert_eq!(views[0].last_message.as_ref().unwrap().content, "gg");
    }
}
