use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lobby_core::AppState;
use serde_json::json;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        // Health
        .route("/health", get(health))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        // Users
        .route("/api/users/@me", get(routes::users::get_me))
        .route("/api/users", get(routes::users::list_users))
        // Conversations
        .route(
            "/api/conversations",
            get(routes::conversations::list_conversations)
                .post(routes::conversations::create_direct),
        )
        .route(
            "/api/conversations/group",
            post(routes::conversations::create_group),
        )
        .route(
            "/api/conversations/group/{conversation_id}",
            axum::routing::delete(routes::conversations::delete_group),
        )
        .route(
            "/api/conversations/users",
            get(routes::conversations::chat_partners),
        )
        .route(
            "/api/conversations/{conversation_id}",
            get(routes::conversations::get_conversation),
        )
        // Messages
        .route("/api/messages", post(routes::messages::send_message))
        .route(
            "/api/messages/{conversation_id}",
            get(routes::messages::get_history),
        )
        // Middleware layers
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    // The matchmaking frontend is served from a separate origin in every
    // deployment we support, so the API stays permissive and relies on
    // bearer tokens rather than cookies.
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "lobby",
            "online_users": state.presence.online_count(),
        })),
    )
}
