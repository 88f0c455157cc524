//! /api/users/ - mailboxes and the aliases pointing at them

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::dispatch::{ResourceAction, USERS};
use super::error::{ApiError, ApiResult};
use super::handlers::{created, listing, parse_body, AppState};
use crate::admin::{CleanupJob, MailDir, Subject};
use crate::security::CsrfToken;
use crate::utils::validate::{email_valid, password_valid};

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    #[serde(rename = "Mail", alias = "mail")]
    pub mail: String,
    #[serde(rename = "Password", alias = "password")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "Password", alias = "password")]
    pub password: String,
}

/// Optional `domain=<id>` filter, at most one value.
pub fn domain_filter(query: Option<&str>) -> ApiResult<Option<i64>> {
    let values: Vec<String> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .filter(|(key, _)| key == "domain")
        .map(|(_, value)| value.into_owned())
        .collect();

    match values.as_slice() {
        [] => Ok(None),
        [value] => value.parse().map(Some).map_err(|_| {
            ApiError::BadRequest(
                "Invalid GET request. query params must contain at most one domain=DOMAIN-ID. DOMAIN-ID must be an int."
                    .to_string(),
            )
        }),
        _ => Err(ApiError::BadRequest(
            "Invalid GET request. query params must contain at most one domain=DOMAIN-ID"
                .to_string(),
        )),
    }
}

pub async fn handle(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    match USERS.action::<i64>(&method, uri.path())? {
        ResourceAction::List => {
            let domain_id = domain_filter(uri.query())?;
            let users = state.mail.list_all_users(domain_id).await?;
            Ok(listing(&csrf, users))
        }
        ResourceAction::Create => add_user(&state, &body).await,
        ResourceAction::Update(id) => change_password(&state, id, &body).await,
        ResourceAction::Delete(id) => delete_user(&state, id).await,
        ResourceAction::Invalid(msg) => Err(ApiError::BadRequest(msg)),
    }
}

async fn add_user(state: &AppState, body: &[u8]) -> ApiResult<Response> {
    let request: AddUserRequest = parse_body(body, "add user")?;
    email_valid(&request.mail).map_err(|e| ApiError::BadRequest(e.0))?;
    password_valid(&request.password).map_err(|e| ApiError::BadRequest(e.0))?;

    let id = state.mail.add_user(&request.mail, &request.password).await?;
    Ok(created("user-id", id))
}

async fn change_password(state: &AppState, id: i64, body: &[u8]) -> ApiResult<Response> {
    let request: ChangePasswordRequest = parse_body(body, "change password")?;
    password_valid(&request.password).map_err(|e| ApiError::BadRequest(e.0))?;

    state.mail.change_user_password(id, &request.password).await?;
    Ok(().into_response())
}

async fn delete_user(state: &AppState, id: i64) -> ApiResult<Response> {
    let lookup = if state.delete_dirs {
        Some(
            state
                .mail
                .user_name(id)
                .await
                .map(|(user, domain)| MailDir::user(domain, user)),
        )
    } else {
        None
    };

    state.mail.delete_user(id).await?;

    if let Some(lookup) = lookup {
        info!(user_id = id, "Scheduling removal of user directory");
        state.cleanup.submit(CleanupJob {
            subject: Subject::User(id),
            lookup,
        });
    }
    Ok(().into_response())
}
