//! /api/aliases/

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;

use super::dispatch::{ResourceAction, ALIASES};
use super::error::{ApiError, ApiResult};
use super::handlers::{created, listing, parse_body, AppState};
use crate::security::CsrfToken;
use crate::utils::validate::{email_valid, parse_mail_parts};

#[derive(Debug, Deserialize)]
pub struct AddAliasRequest {
    /// May be a catch-all like `@example.com`.
    #[serde(rename = "Source", alias = "source")]
    pub source: String,
    #[serde(rename = "Dest", alias = "dest")]
    pub dest: String,
}

pub async fn handle(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    match ALIASES.action::<i64>(&method, uri.path())? {
        ResourceAction::List => Ok(listing(&csrf, state.mail.list_aliases(None).await?)),
        ResourceAction::Create => add_alias(&state, &body).await,
        ResourceAction::Delete(id) => {
            state.mail.delete_alias(id).await?;
            Ok(().into_response())
        }
        ResourceAction::Update(_) => Err(ApiError::BadRequest(format!(
            "Invalid method for {}: {}",
            ALIASES.path, method
        ))),
        ResourceAction::Invalid(msg) => Err(ApiError::BadRequest(msg)),
    }
}

async fn add_alias(state: &AppState, body: &[u8]) -> ApiResult<Response> {
    let request: AddAliasRequest = parse_body(body, "add alias")?;
    parse_mail_parts(&request.source).map_err(|e| ApiError::BadRequest(e.0))?;
    email_valid(&request.dest).map_err(|e| ApiError::BadRequest(e.0))?;

    let id = state.mail.add_alias(&request.source, &request.dest).await?;
    Ok(created("alias-id", id))
}
