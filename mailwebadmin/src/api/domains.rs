//! /api/domains/

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::dispatch::{ResourceAction, DOMAINS};
use super::error::{ApiError, ApiResult};
use super::handlers::{created, listing, parse_body, AppState};
use crate::admin::{CleanupJob, MailDir, Subject};
use crate::security::CsrfToken;
use crate::utils::validate::domain_name_valid;

#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    #[serde(rename = "domain-name")]
    pub domain_name: String,
}

pub async fn handle(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    match DOMAINS.action::<i64>(&method, uri.path())? {
        ResourceAction::List => Ok(listing(&csrf, state.mail.list_domains().await?)),
        ResourceAction::Create => add_domain(&state, &body).await,
        ResourceAction::Delete(id) => delete_domain(&state, id).await,
        ResourceAction::Update(_) => Err(ApiError::BadRequest(format!(
            "Invalid method for {}: {}",
            DOMAINS.path, method
        ))),
        ResourceAction::Invalid(msg) => Err(ApiError::BadRequest(msg)),
    }
}

async fn add_domain(state: &AppState, body: &[u8]) -> ApiResult<Response> {
    let request: AddDomainRequest = parse_body(body, "add domain")?;
    domain_name_valid(&request.domain_name).map_err(|e| ApiError::BadRequest(e.0))?;

    let id = state.mail.add_domain(&request.domain_name).await?;
    Ok(created("domain-id", id))
}

async fn delete_domain(state: &AppState, id: i64) -> ApiResult<Response> {
    // the name is gone once the row is deleted
    let lookup = if state.delete_dirs {
        Some(state.mail.domain_name(id).await.map(MailDir::domain))
    } else {
        None
    };

    state.mail.delete_domain(id).await?;

    if let Some(lookup) = lookup {
        info!(domain_id = id, "Scheduling removal of domain directory");
        state.cleanup.submit(CleanupJob {
            subject: Subject::Domain(id),
            lookup,
        });
    }
    Ok(().into_response())
}
