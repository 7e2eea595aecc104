mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tandem_core::{auth, AppConfig, AppState};
use tandem_models::UserId;

/// Keyed by user id and shared by every gateway connection, so typing floods
/// from one user are counted together no matter how the sockets churn.
pub(crate) type TypingLimiter = Arc<DefaultKeyedRateLimiter<i64>>;

pub fn gateway_router(config: &AppConfig) -> Router<AppState> {
    let per_minute = NonZeroU32::new(config.typing_events_per_minute.max(1))
        .unwrap_or(NonZeroU32::MIN);
    let typing_limiter: TypingLimiter = Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)));
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .layer(Extension(typing_limiter))
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Authenticates the upgrade itself; every user id the client presents later
/// must match the token's subject.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    Extension(typing_limiter): Extension<TypingLimiter>,
    headers: HeaderMap,
) -> Response {
    let token = query.token.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.to_string())
    });
    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match auth::validate_token(&token, &state.config.jwt_secret) {
        Ok(claims) => {
            let user_id = UserId(claims.sub);
            ws.on_upgrade(move |socket| {
                handler::handle_connection(socket, state, user_id, typing_limiter)
            })
            .into_response()
        }
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}
