mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use lobby_core::AppState;
use serde::Deserialize;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

/// The token is checked before the upgrade completes; a bad or missing token
/// is a plain 401, not a short-lived socket.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<GatewayParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let user_id = match authenticate(params.token.as_deref(), &state.config.jwt_secret) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, user_id))
}

fn authenticate(token: Option<&str>, secret: &str) -> Result<i64, StatusCode> {
    let token = token.ok_or(StatusCode::UNAUTHORIZED)?;
    lobby_core::auth::validate_token(token, secret)
        .map(|claims| claims.sub)
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_bad_gateway_token_is_unauthorized() {
        assert_eq!(
            authenticate(None, "secret"),
            Err(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            authenticate(Some("not-a-jwt"), "secret"),
            Err(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn valid_gateway_token_resolves_the_user() {
        let token = lobby_core::auth::create_token(42, "secret", 60).unwrap();
        assert_eq!(authenticate(Some(&token), "secret"), Ok(42));
    }
}
