use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use lobby_core::{presence, AppState};
use lobby_models::gateway::{ClientEvent, OutboundEvent, SenderInfo};
use tokio::time::Duration;

use crate::session::Session;

const WS_PING_INTERVAL_SECS: u64 = 20;

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &Session,
    event: &OutboundEvent,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(
                user_id = session.user_id,
                "failed to serialize outbound event: {err}"
            );
            return Ok(());
        }
    };
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_error(
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &Session,
    message: &str,
) -> Result<(), ()> {
    send_event(
        sender,
        session,
        &OutboundEvent::Error {
            message: message.to_string(),
        },
    )
    .await
}

pub async fn handle_connection(socket: WebSocket, state: AppState, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new(user_id);
    let mut event_rx = state.event_bus.subscribe();

    let mut ws_ping_interval = tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ws_ping_interval.tick().await; // skip immediate first tick

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                if handle_client_event(event, &mut sender, &mut session, &state)
                                    .await
                                    .is_err()
                                {
                                    break "websocket send error".to_string();
                                }
                            }
                            Err(err) => {
                                tracing::debug!(
                                    user_id = session.user_id,
                                    "unrecognized gateway event: {err}"
                                );
                                // Bad payloads get an error event, never a close.
                                if send_error(&mut sender, &session, "unrecognized event")
                                    .await
                                    .is_err()
                                {
                                    break "websocket send error".to_string();
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        break "client close frame".to_string();
                    }
                    Some(Err(err)) => {
                        break format!("websocket receive error: {err}");
                    }
                    None => {
                        break "websocket stream ended".to_string();
                    }
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        // A deleted room is gone for this session whether or
                        // not the payload is addressed to it; the router
                        // entry was already evicted centrally.
                        if let Some(room_id) = event.evict_room_id {
                            session.rooms.remove(&room_id);
                        }

                        if !session.should_receive_event(
                            event.room_id,
                            event.target_user_ids.as_deref(),
                            event.except_user_id,
                        ) {
                            continue;
                        }

                        if send_event(&mut sender, &session, &event.event).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "gateway event stream lagged for user {} (missed {} events); forcing reconnect",
                            session.user_id,
                            skipped
                        );
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    tracing::info!(
        "client {} disconnected: {}",
        session.user_id,
        disconnect_reason
    );

    state.rooms.leave_all(&session.session_id);
    if session.ready {
        presence::mark_offline(
            &state.db,
            &state.event_bus,
            &state.presence,
            session.user_id,
            &session.session_id,
        )
        .await;
    }
}

async fn handle_client_event(
    event: ClientEvent,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    // Everything except setup is ignored until the session is ready.
    if !session.ready && !matches!(event, ClientEvent::Setup { .. }) {
        tracing::debug!(
            user_id = session.user_id,
            "dropping pre-setup gateway event"
        );
        return Ok(());
    }

    match event {
        ClientEvent::Setup { id, user_name } => {
            // Identity comes from the token; the payload id is advisory.
            if id != session.user_id.to_string() {
                tracing::debug!(
                    user_id = session.user_id,
                    claimed = %id,
                    "setup id does not match authenticated user"
                );
            }
            session.display_name = user_name;
            session.ready = true;
            presence::mark_online(
                &state.db,
                &state.event_bus,
                &state.presence,
                session.user_id,
                &session.session_id,
            )
            .await;
            send_event(sender, session, &OutboundEvent::Connected).await
        }
        ClientEvent::EnterRoom { room_id } => {
            let Ok(room_id) = room_id.parse::<i64>() else {
                return send_error(sender, session, "invalid room id").await;
            };
            // Idempotent: re-entering a joined room changes nothing.
            state.rooms.join(room_id, &session.session_id);
            session.rooms.insert(room_id);
            Ok(())
        }
        ClientEvent::LeaveRoom { room_id } => {
            let Ok(room_id) = room_id.parse::<i64>() else {
                return send_error(sender, session, "invalid room id").await;
            };
            state.rooms.leave(room_id, &session.session_id);
            session.rooms.remove(&room_id);
            Ok(())
        }
        ClientEvent::NewMessage {
            conversation_id,
            message_id,
            message,
            pic,
            timestamp,
            ..
        } => {
            let Ok(conversation_id) = conversation_id.parse::<i64>() else {
                return send_error(sender, session, "invalid conversation id").await;
            };
            // Re-validate against the store; the durable write may have been
            // rolled back or the sender removed since.
            let conversation = match lobby_core::conversation::ensure_participant(
                &state.db,
                conversation_id,
                session.user_id,
            )
            .await
            {
                Ok(conversation) => conversation,
                Err(err) => {
                    tracing::debug!(
                        user_id = session.user_id,
                        conversation_id,
                        "rejecting message broadcast: {err}"
                    );
                    return send_error(sender, session, "cannot broadcast to this conversation")
                        .await;
                }
            };
            let sender_user = match lobby_db::users::get_user_by_id(&state.db, session.user_id)
                .await
            {
                Ok(Some(user)) => user,
                _ => return send_error(sender, session, "sender not found").await,
            };

            state.event_bus.dispatch_room(
                OutboundEvent::ReceiveMessage {
                    message_id,
                    conversation_id: conversation_id.to_string(),
                    sender: session.user_id.to_string(),
                    sender_name: session.display_name.clone(),
                    pic,
                    text: message,
                    timestamp,
                    is_group: conversation.is_group,
                    group_name: conversation.group_name.clone(),
                    sender_info: SenderInfo {
                        id: sender_user.id.to_string(),
                        username: sender_user.username,
                        avatar_url: sender_user.avatar_url,
                    },
                },
                conversation_id,
                Some(session.user_id),
            );
            Ok(())
        }
        ClientEvent::Typing {
            conversation_id,
            sender: sender_id,
            sender_name,
        } => {
            relay_typing(state, session, &conversation_id, sender_id, sender_name, true);
            Ok(())
        }
        ClientEvent::TypingStop {
            conversation_id,
            sender: sender_id,
            sender_name,
        } => {
            relay_typing(state, session, &conversation_id, sender_id, sender_name, false);
            Ok(())
        }
        ClientEvent::GroupCreated {
            group_id,
            group_name,
            creator_name,
            ..
        } => {
            let Ok(group_id) = group_id.parse::<i64>() else {
                return send_error(sender, session, "invalid group id").await;
            };
            // Only the group's admin may announce it, and only for a group
            // that actually exists.
            let conversation =
                match lobby_db::conversations::get_conversation(&state.db, group_id).await {
                    Ok(Some(conversation)) if conversation.is_group => conversation,
                    _ => return send_error(sender, session, "unknown group").await,
                };
            if conversation.admin_id != Some(session.user_id) {
                return send_error(sender, session, "only the group admin may announce it").await;
            }
            // The stored membership is authoritative; the payload's list is
            // only what the client believes.
            let participant_ids =
                match lobby_db::conversations::participant_ids(&state.db, group_id).await {
                    Ok(ids) => ids,
                    Err(_) => return send_error(sender, session, "unknown group").await,
                };
            lobby_core::conversation::notify_group_created(
                &state.event_bus,
                session.user_id,
                group_id,
                &group_name,
                &creator_name,
                &participant_ids,
            );
            Ok(())
        }
        ClientEvent::GroupDeleted {
            group_id,
            participants,
            group_name,
            admin_name,
        } => {
            let Ok(group_id) = group_id.parse::<i64>() else {
                return send_error(sender, session, "invalid group id").await;
            };
            // The durable delete happened over REST; the announcement is only
            // valid once the row is gone.
            match lobby_db::conversations::get_conversation(&state.db, group_id).await {
                Ok(None) => {}
                _ => return send_error(sender, session, "group still exists").await,
            }
            let participant_ids = parse_ids(&participants);
            session.rooms.remove(&group_id);
            lobby_core::conversation::notify_group_deleted(
                &state.event_bus,
                &state.rooms,
                session.user_id,
                group_id,
                &group_name,
                &admin_name,
                &participant_ids,
            );
            Ok(())
        }
    }
}

fn relay_typing(
    state: &AppState,
    session: &Session,
    conversation_id: &str,
    sender_id: String,
    sender_name: String,
    started: bool,
) {
    let Ok(room_id) = conversation_id.parse::<i64>() else {
        return;
    };
    // Typing indicators only flow inside rooms the session has entered.
    if !session.rooms.contains(&room_id) {
        return;
    }
    let event = if started {
        OutboundEvent::Typing {
            conversation_id: room_id.to_string(),
            sender: sender_id,
            sender_name,
        }
    } else {
        OutboundEvent::TypingStop {
            conversation_id: room_id.to_string(),
            sender: sender_id,
            sender_name,
        }
    };
    state
        .event_bus
        .dispatch_room(event, room_id, Some(session.user_id));
}

fn parse_ids(raw: &[String]) -> Vec<i64> {
    raw.iter().filter_map(|s| s.parse().ok()).collect()
}
