use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use lobby_core::{AppConfig, AppState};

struct TestContext {
    app: Router,
    db: lobby_db::DbPool,
    jwt_secret: String,
}

struct TestUser {
    id: i64,
    token: String,
}

impl TestContext {
    async fn new() -> anyhow::Result<Self> {
        let db = lobby_db::create_pool("sqlite::memory:", 1).await?;
        lobby_db::run_migrations(&db).await?;

        let jwt_secret = "integration-test-secret".to_string();
        let state = AppState::new(
            db.clone(),
            AppConfig {
                jwt_secret: jwt_secret.clone(),
                jwt_expiry_seconds: 3600,
            },
        );
        let app = lobby_api::build_router().with_state(state);

        Ok(Self {
            app,
            db,
            jwt_secret,
        })
    }

    async fn create_user(&self, name_hint: &str) -> anyhow::Result<TestUser> {
        let nonce = Uuid::new_v4().simple().to_string();
        let username = format!("{name_hint}_{nonce}");
        let email = format!("{nonce}@example.com");
        let password_hash = lobby_core::auth::hash_password("IntegrationPass123!")?;
        let id = lobby_util::snowflake::generate(1);

        lobby_db::users::create_user(&self.db, id, &username, &email, &password_hash).await?;
        let token = lobby_core::auth::create_token(id, &self.jwt_secret, 3600)?;
        Ok(TestUser { id, token })
    }

    async fn request_json(
        &self,
        token: Option<&str>,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = if let Some(payload) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(payload.to_string()))?
        } else {
            builder.body(Body::empty())?
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let payload = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body_bytes) }))
        };

        Ok((status, payload))
    }
}

/// Registration caps usernames at 32 chars, so route-level tests use a short
/// nonce rather than the full uuid the direct-provisioning helper uses.
fn short_nonce() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn create_direct(
    ctx: &TestContext,
    me: &TestUser,
    other: &TestUser,
) -> anyhow::Result<(StatusCode, Value)> {
    ctx.request_json(
        Some(&me.token),
        Method::POST,
        "/api/conversations",
        Some(json!({ "participant_id": other.id.to_string() })),
    )
    .await
}

#[tokio::test]
async fn register_and_login_round_trip() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let nonce = short_nonce();

    let (status, payload) = ctx
        .request_json(
            None,
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "username": format!("player_{nonce}"),
                "email": format!("{nonce}@example.com"),
                "password": "IntegrationPass123!",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert!(payload["token"].is_string());

    let (status, payload) = ctx
        .request_json(
            None,
            Method::POST,
            "/api/auth/login",
            Some(json!({
                "username": format!("player_{nonce}"),
                "password": "IntegrationPass123!",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let token = payload["token"].as_str().unwrap().to_string();

    let (status, me) = ctx
        .request_json(Some(&token), Method::GET, "/api/users/@me", None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], format!("player_{nonce}"));
    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_fails() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let nonce = short_nonce();
    let (status, _) = ctx
        .request_json(
            None,
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "username": format!("player_{nonce}"),
                "email": format!("{nonce}@example.com"),
                "password": "IntegrationPass123!",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx
        .request_json(
            None,
            Method::POST,
            "/api/auth/login",
            Some(json!({
                "username": format!("player_{nonce}"),
                "password": "wrong-password",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn requests_without_token_are_rejected() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, _) = ctx
        .request_json(None, Method::GET, "/api/conversations", None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn direct_conversation_is_canonical_both_directions() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;

    let (status, first) = create_direct(&ctx, &ada, &grace).await?;
    assert_eq!(status, StatusCode::CREATED);

    // Reverse direction resolves to the same conversation.
    let (status, second) = create_direct(&ctx, &grace, &ada).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["is_group"], json!(false));
    Ok(())
}

#[tokio::test]
async fn direct_with_unknown_user_is_not_found() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::POST,
            "/api/conversations",
            Some(json!({ "participant_id": "999999" })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn group_requires_two_other_participants() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;

    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::POST,
            "/api/conversations/group",
            Some(json!({
                "group_name": "Squad",
                "participants": [grace.id.to_string()],
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn group_creator_becomes_admin() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;
    let edsger = ctx.create_user("edsger").await?;

    let (status, group) = ctx
        .request_json(
            Some(&ada.token),
            Method::POST,
            "/api/conversations/group",
            Some(json!({
                "group_name": "Squad",
                "participants": [grace.id.to_string(), edsger.id.to_string()],
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["is_group"], json!(true));
    assert_eq!(group["admin"]["id"], json!(ada.id.to_string()));
    assert_eq!(group["participants"].as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn only_the_admin_can_delete_a_group() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;
    let edsger = ctx.create_user("edsger").await?;

    let (_, group) = ctx
        .request_json(
            Some(&ada.token),
            Method::POST,
            "/api/conversations/group",
            Some(json!({
                "group_name": "Squad",
                "participants": [grace.id.to_string(), edsger.id.to_string()],
            })),
        )
        .await?;
    let group_id = group["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .request_json(
            Some(&grace.token),
            Method::DELETE,
            &format!("/api/conversations/group/{group_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::DELETE,
            &format!("/api/conversations/group/{group_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::GET,
            &format!("/api/conversations/{group_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn direct_conversations_cannot_be_deleted() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;

    let (_, direct) = create_direct(&ctx, &ada, &grace).await?;
    let id = direct["id"].as_str().unwrap();

    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::DELETE,
            &format!("/api/conversations/group/{id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn message_send_and_ordered_history() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;

    let (_, direct) = create_direct(&ctx, &ada, &grace).await?;
    let conversation_id = direct["id"].as_str().unwrap().to_string();

    for (user, text) in [(&ada, "gg wp"), (&grace, "rematch?"), (&ada, "queue up")] {
        let (status, _) = ctx
            .request_json(
                Some(&user.token),
                Method::POST,
                "/api/messages",
                Some(json!({ "conversation_id": conversation_id, "content": text })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, history) = ctx
        .request_json(
            Some(&grace.token),
            Method::GET,
            &format!("/api/messages/{conversation_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["gg wp", "rematch?", "queue up"]);

    // The list view carries the latest message.
    let (_, conversations) = ctx
        .request_json(Some(&ada.token), Method::GET, "/api/conversations", None)
        .await?;
    assert_eq!(
        conversations[0]["last_message"]["content"],
        json!("queue up")
    );
    Ok(())
}

#[tokio::test]
async fn non_participant_send_is_forbidden_and_leaves_nothing() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;
    let edsger = ctx.create_user("edsger").await?;

    let (_, direct) = create_direct(&ctx, &ada, &grace).await?;
    let conversation_id = direct["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .request_json(
            Some(&edsger.token),
            Method::POST,
            "/api/messages",
            Some(json!({ "conversation_id": conversation_id, "content": "let me in" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request_json(
            Some(&edsger.token),
            Method::GET,
            &format!("/api/messages/{conversation_id}"),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, history) = ctx
        .request_json(
            Some(&ada.token),
            Method::GET,
            &format!("/api/messages/{conversation_id}"),
            None,
        )
        .await?;
    assert!(history.as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_message_is_rejected() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;

    let (_, direct) = create_direct(&ctx, &ada, &grace).await?;
    let conversation_id = direct["id"].as_str().unwrap();

    let (status, _) = ctx
        .request_json(
            Some(&ada.token),
            Method::POST,
            "/api/messages",
            Some(json!({ "conversation_id": conversation_id, "content": "   " })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn chat_partners_lists_direct_counterparts() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let ada = ctx.create_user("ada").await?;
    let grace = ctx.create_user("grace").await?;
    let edsger = ctx.create_user("edsger").await?;

    create_direct(&ctx, &ada, &grace).await?;

    let (status, payload) = ctx
        .request_json(
            Some(&ada.token),
            Method::GET,
            "/api/conversations/users",
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let partner_ids: Vec<&str> = payload["partners"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert_eq!(partner_ids, [grace.id.to_string().as_str()]);

    let roster_ids: Vec<&str> = payload["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert!(roster_ids.contains(&grace.id.to_string().as_str()));
    assert!(roster_ids.contains(&edsger.id.to_string().as_str()));
    assert!(!roster_ids.contains(&ada.id.to_string().as_str()));
    Ok(())
}
