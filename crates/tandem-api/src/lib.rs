use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tandem_core::AppState;
use tower_http::cors::CorsLayer;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route("/api/v1/users/@me", get(routes::auth::get_me))
        // Pairing lifecycle
        .route("/api/v1/pairings", post(routes::pairing::request_pairing))
        .route("/api/v1/pairings/pending", get(routes::pairing::list_pending))
        .route("/api/v1/pairings/partner", get(routes::pairing::get_partner))
        .route(
            "/api/v1/pairings/{pairing_id}/accept",
            post(routes::pairing::accept_pairing),
        )
        .route(
            "/api/v1/pairings/{pairing_id}/reject",
            post(routes::pairing::reject_pairing),
        )
        // Room history and read state
        .route(
            "/api/v1/rooms/{room_id}/messages",
            get(routes::chat::get_history),
        )
        .route(
            "/api/v1/rooms/{room_id}/unread",
            get(routes::chat::get_unread_count),
        )
        .route("/api/v1/rooms/{room_id}/read", post(routes::chat::mark_read))
        .route(
            "/api/v1/rooms/{room_id}/last-message",
            get(routes::chat::get_last_message),
        )
        // Reactions
        .route(
            "/api/v1/messages/{message_id}/reactions",
            put(routes::chat::upsert_reaction).get(routes::chat::list_reactions),
        )
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
