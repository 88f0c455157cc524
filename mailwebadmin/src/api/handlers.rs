//! Shared state and the session handlers: login, logout and the root page

use axum::{
    body::Bytes,
    extract::{FromRef, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{ApiError, ApiResult};
use crate::admin::JobQueue;
use crate::security::csrf::CSRF_HEADER;
use crate::security::{
    AdminUsers, CsrfToken, LoginOutcome, Session, SessionController, SessionError,
};
use crate::storage::MailDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub mail: MailDb,
    pub admins: AdminUsers,
    pub sessions: SessionController,
    pub cleanup: Arc<dyn JobQueue>,
    /// Remove mail directories of deleted domains and users.
    pub delete_dirs: bool,
    key: Key,
}

impl AppState {
    pub fn new(
        mail: MailDb,
        admins: AdminUsers,
        sessions: SessionController,
        cleanup: Arc<dyn JobQueue>,
        delete_dirs: bool,
        key: Key,
    ) -> Self {
        Self {
            mail,
            admins,
            sessions,
            cleanup,
            delete_dirs,
            key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

pub fn redirect(location: &'static str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// Decode a JSON request body, anything unreadable is a client error.
pub fn parse_body<T: DeserializeOwned>(body: &[u8], what: &str) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        info!("Invalid request syntax for {}: {}", what, e);
        ApiError::BadRequest("Invalid request syntax".to_string())
    })
}

/// `{"<field>": id}` for a freshly created resource.
///
/// The row is already written, so an encoding failure is only logged.
pub fn created(field: &str, id: i64) -> Response {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), id.into());

    match serde_json::to_vec(&body) {
        Ok(bytes) => ([(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            warn!(field, id, "Can't encode map to JSON: {}", e);
            StatusCode::OK.into_response()
        }
    }
}

/// JSON list payload with a fresh CSRF token header.
pub fn listing<T: Serialize>(csrf: &CsrfToken, payload: T) -> Response {
    ([(CSRF_HEADER, csrf.0.clone())], Json(payload)).into_response()
}

/// Login request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(rename = "remember-me")]
    pub remember_me: bool,
}

/// /login - GET hands out a CSRF token, POST logs in
pub async fn login(
    State(state): State<AppState>,
    Extension(csrf): Extension<CsrfToken>,
    jar: PrivateCookieJar,
    method: Method,
    body: Bytes,
) -> Response {
    if method == Method::GET {
        (StatusCode::OK, [(CSRF_HEADER, csrf.0)]).into_response()
    } else if method == Method::POST {
        match login_submit(&state, jar, &body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    } else {
        ApiError::BadRequest(format!("Invalid method for \"/login\": {}", method)).into_response()
    }
}

async fn login_submit(state: &AppState, jar: PrivateCookieJar, body: &[u8]) -> ApiResult<Response> {
    let request: LoginRequest = parse_body(body, "login")?;

    let admin_id = match state
        .admins
        .validate(&request.username, &request.password)
        .await?
    {
        LoginOutcome::Authenticated(id) => id,
        LoginOutcome::UnknownUser | LoginOutcome::WrongPassword => {
            info!(username = %request.username, "Login failed");
            return Err(ApiError::BadRequest("Login failed".to_string()));
        }
    };

    let mut session = state.sessions.create_auth_session(admin_id).await?;
    session.values.remember_me = Some(request.remember_me);
    if !request.remember_me {
        session.set_max_age(0);
    }

    let jar = match session.save(&jar) {
        Ok(jar) => jar,
        Err(e) => {
            error!("Saving session failed: {}", e);
            jar
        }
    };

    info!(username = %request.username, admin_id, "Admin logged in");
    Ok((jar, redirect("/")).into_response())
}

/// /logout - end the session and go back to the login page
///
/// Runs without the login check so the removal cookie set here is final.
pub async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
    match state.sessions.validate_session(&jar).await {
        Ok(mut session) => {
            let jar = state.sessions.end_session(&mut session, &jar).await;
            (jar, redirect("/login")).into_response()
        }
        Err(SessionError::Store(e)) => ApiError::Internal(e).into_response(),
        Err(e) => {
            warn!("Logout without a valid session: {}", e);
            redirect("/login")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub username: String,
}

/// / - the logged in admin
pub async fn root(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    method: Method,
) -> ApiResult<Response> {
    if method != Method::GET {
        return Err(ApiError::BadRequest(format!(
            "Invalid method for \"/\": {}",
            method
        )));
    }

    match state.admins.username(session.admin_id()).await? {
        Some(username) => Ok(Json(RootResponse { username }).into_response()),
        None => {
            debug!(admin_id = session.admin_id(), "Session of a deleted admin");
            Ok(redirect("/login"))
        }
    }
}
