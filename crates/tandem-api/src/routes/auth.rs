use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tandem_core::{auth, AppState};
use tandem_db::users::UserRow;
use tandem_util::validation::{validate_password, validate_username};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn user_json(user: &UserRow) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "displayName": user.display_name,
        "createdAt": user.created_at,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.registration_enabled {
        return Err(ApiError::Forbidden);
    }
    validate_username(&body.username)?;
    validate_password(&body.password)?;

    if tandem_db::users::get_user_by_username(&state.db, &body.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username is taken".into()));
    }

    let hash =
        auth::hash_password(&body.password).map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let id = tandem_util::snowflake::generate(state.config.worker_id);
    let display_name = body.display_name.unwrap_or_else(|| body.username.clone());
    let user = tandem_db::users::create_user(&state.db, id, &body.username, &display_name, &hash)
        .await?;
    let token = auth::create_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry_seconds)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": user_json(&user) })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = tandem_db::users::get_user_by_username(&state.db, &body.username)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let valid = auth::verify_password(&body.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    if !valid {
        return Err(ApiError::Unauthorized);
    }
    let token = auth::create_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry_seconds)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    Ok(Json(json!({ "token": token, "user": user_json(&user) })))
}

pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = tandem_db::users::get_user_by_id(&state.db, auth_user.user_id.0)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user_json(&user)))
}
