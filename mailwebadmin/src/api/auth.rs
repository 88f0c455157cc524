//! Login check for the protected routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use tracing::{debug, error};

use super::error::ApiError;
use super::handlers::{redirect, AppState};
use crate::security::SessionError;

/// Require an authenticated session.
///
/// Anonymous requests are redirected to `/login`. The session is saved
/// back into the cookie (respecting remember-me) and handed to the handler
/// as a request extension.
pub async fn login_required(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let mut session = match state.sessions.validate_session(&jar).await {
        Ok(session) => session,
        Err(SessionError::Store(e)) => return ApiError::Internal(e).into_response(),
        Err(e) => {
            debug!(path = %req.uri().path(), "Not logged in: {}", e);
            return redirect("/login");
        }
    };

    session.apply_remember_me();
    let jar = match session.save(&jar) {
        Ok(jar) => jar,
        Err(e) => {
            error!("Saving session failed: {}", e);
            jar
        }
    };

    req.extensions_mut().insert(session);
    let response = next.run(req).await;
    (jar, response).into_response()
}
