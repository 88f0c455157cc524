//! /api/admins/ - accounts of the web interface
//!
//! Admins are addressed by username. Changing the password or deleting an
//! admin ends every session of that admin.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use tracing::{error, warn};

use super::dispatch::{ResourceAction, ADMINS};
use super::error::{ApiError, ApiResult};
use super::handlers::{created, listing, parse_body, AppState};
use crate::security::{CsrfToken, SessionController};
use crate::utils::validate::{admin_name_valid, password_valid};

#[derive(Debug, Deserialize)]
pub struct AddAdminRequest {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeAdminPasswordRequest {
    #[serde(alias = "Password")]
    pub password: String,
}

pub async fn handle(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    match ADMINS.action::<String>(&method, uri.path())? {
        ResourceAction::List => Ok(listing(&csrf, state.admins.list_users().await?)),
        ResourceAction::Create => add_admin(&state, &body).await,
        ResourceAction::Update(name) => change_password(&state, &name, &body).await,
        ResourceAction::Delete(name) => delete_admin(&state, &name).await,
        ResourceAction::Invalid(msg) => Err(ApiError::BadRequest(msg)),
    }
}

async fn add_admin(state: &AppState, body: &[u8]) -> ApiResult<Response> {
    let request: AddAdminRequest = parse_body(body, "add admin")?;
    admin_name_valid(&request.username).map_err(|e| ApiError::BadRequest(e.0))?;
    password_valid(&request.password).map_err(|e| ApiError::BadRequest(e.0))?;

    let id = state
        .admins
        .insert(&request.username, &request.password)
        .await?;
    Ok(created("admin-id", id))
}

async fn change_password(state: &AppState, name: &str, body: &[u8]) -> ApiResult<Response> {
    let request: ChangeAdminPasswordRequest = parse_body(body, "change admin password")?;
    password_valid(&request.password).map_err(|e| ApiError::BadRequest(e.0))?;

    let Some(admin_id) = state.admins.user_id(name).await? else {
        return Err(ApiError::BadRequest(format!(
            "Admin user \"{}\" not found",
            name
        )));
    };
    if !state.admins.update_password(name, &request.password).await? {
        return Err(ApiError::BadRequest(format!(
            "Admin user \"{}\" not found",
            name
        )));
    }

    invalidate_sessions(&state.sessions, admin_id).await;
    Ok(().into_response())
}

/// The id is looked up before the delete. A concurrent rename between the
/// two calls would invalidate the sessions of the wrong id; there is no
/// rename operation, so this is left unguarded.
async fn delete_admin(state: &AppState, name: &str) -> ApiResult<Response> {
    let Some(admin_id) = state.admins.user_id(name).await? else {
        warn!(username = name, "Admin user for delete not found");
        return Ok(().into_response());
    };

    state.admins.delete(name).await?;
    invalidate_sessions(&state.sessions, admin_id).await;
    Ok(().into_response())
}

async fn invalidate_sessions(sessions: &SessionController, admin_id: i64) {
    if let Err(e) = sessions.delete_entries_for_user(admin_id).await {
        error!(admin_id, "Failed to invalidate sessions of admin: {}", e);
    }
}
