use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tandem_core::store::stored_from_row;
use tandem_core::AppState;
use tandem_models::message::ReactionEntry;
use tandem_models::{MessageId, RoomId, UserId};
use tandem_util::validation::validate_emoji;

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// The caller must be one of the two members of the pairing behind the room.
async fn require_room_member(
    state: &AppState,
    user_id: UserId,
    room_id: RoomId,
) -> Result<(), ApiError> {
    let pairing = state.directory.active_pairing(user_id).await?;
    match pairing {
        Some(p) if p.room_id == room_id => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

/// Full room history, ascending. Retrieval marks the partner's messages read.
pub async fn get_history(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(room_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = RoomId(room_id);
    require_room_member(&state, auth_user.user_id, room_id).await?;
    let rows = tandem_db::messages::get_room_messages(&state.db, room_id.0).await?;
    tandem_db::messages::mark_read(&state.db, room_id.0, auth_user.user_id.0).await?;
    let messages: Vec<_> = rows.into_iter().map(stored_from_row).collect();
    Ok(Json(messages))
}

pub async fn get_unread_count(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(room_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = RoomId(room_id);
    require_room_member(&state, auth_user.user_id, room_id).await?;
    let count = tandem_db::messages::count_unread(&state.db, room_id.0, auth_user.user_id.0).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(room_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = RoomId(room_id);
    require_room_member(&state, auth_user.user_id, room_id).await?;
    let updated =
        tandem_db::messages::mark_read(&state.db, room_id.0, auth_user.user_id.0).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn get_last_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(room_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = RoomId(room_id);
    require_room_member(&state, auth_user.user_id, room_id).await?;
    let last = tandem_db::messages::get_last_message(&state.db, room_id.0)
        .await?
        .map(stored_from_row);
    Ok(Json(last))
}

#[derive(Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

async fn reaction_entries(
    state: &AppState,
    message_id: MessageId,
) -> Result<Vec<ReactionEntry>, ApiError> {
    let rows = tandem_db::reactions::get_message_reactions(&state.db, message_id.0).await?;
    Ok(rows
        .into_iter()
        .map(|row| ReactionEntry {
            user_id: UserId(row.user_id),
            emoji: row.emoji,
        })
        .collect())
}

/// Set the caller's reaction on a message, replacing any earlier one, and
/// fan the message's resulting reaction state out to the room.
pub async fn upsert_reaction(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<i64>,
    Json(body): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_emoji(&body.emoji)?;
    let message = tandem_db::messages::get_message(&state.db, message_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let room_id = RoomId(message.room_id);
    require_room_member(&state, auth_user.user_id, room_id).await?;

    tandem_db::reactions::upsert_reaction(&state.db, message_id, auth_user.user_id.0, &body.emoji)
        .await?;
    let entries = reaction_entries(&state, MessageId(message_id)).await?;
    state
        .router
        .broadcast_reactions(room_id, MessageId(message_id), entries.clone());
    Ok(Json(entries))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let message = tandem_db::messages::get_message(&state.db, message_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    require_room_member(&state, auth_user.user_id, RoomId(message.room_id)).await?;
    let entries = reaction_entries(&state, MessageId(message_id)).await?;
    Ok(Json(entries))
}
