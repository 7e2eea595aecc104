use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tandem_core::AppState;
use tandem_db::pairings::PairingRow;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
pub struct PairingRequest {
    pub username: String,
}

fn pairing_json(row: &PairingRow) -> Value {
    json!({
        "id": row.id,
        "requesterId": row.requester_id,
        "recipientId": row.recipient_id,
        "status": row.status,
        "createdAt": row.created_at,
        "resolvedAt": row.resolved_at,
    })
}

/// Request a pairing with another user, identified by username.
pub async fn request_pairing(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(body): Json<PairingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = tandem_db::users::get_user_by_username(&state.db, &body.username)
        .await?
        .ok_or(ApiError::NotFound)?;
    let row = tandem_core::pairing::request_pairing(
        &state.db,
        state.config.worker_id,
        auth_user.user_id,
        tandem_models::UserId(recipient.id),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(pairing_json(&row))))
}

/// Incoming PENDING requests addressed to the caller.
pub async fn list_pending(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let rows = tandem_db::pairings::list_incoming_pending(&state.db, auth_user.user_id.0).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let requester = tandem_db::users::get_user_by_id(&state.db, row.requester_id).await?;
        let mut entry = pairing_json(row);
        if let (Value::Object(map), Some(requester)) = (&mut entry, requester) {
            map.insert(
                "requester".into(),
                json!({
                    "id": requester.id,
                    "username": requester.username,
                    "displayName": requester.display_name,
                }),
            );
        }
        out.push(entry);
    }
    Ok(Json(out))
}

pub async fn accept_pairing(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(pairing_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = tandem_core::pairing::respond_pairing(
        &state.db,
        state.directory.as_ref(),
        pairing_id,
        auth_user.user_id,
        true,
    )
    .await?;
    Ok(Json(pairing_json(&row)))
}

pub async fn reject_pairing(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(pairing_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = tandem_core::pairing::respond_pairing(
        &state.db,
        state.directory.as_ref(),
        pairing_id,
        auth_user.user_id,
        false,
    )
    .await?;
    Ok(Json(pairing_json(&row)))
}

/// The caller's active pairing: partner profile plus the room it unlocks.
pub async fn get_partner(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let pairing = state
        .directory
        .active_pairing(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let partner = tandem_db::users::get_user_by_id(&state.db, pairing.partner_id.0)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({
        "roomId": pairing.room_id,
        "partner": {
            "id": partner.id,
            "username": partner.username,
            "displayName": partner.display_name,
        },
    })))
}
