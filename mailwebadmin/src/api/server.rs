//! API Server - HTTP server for the admin interface

use axum::{middleware, routing::any, Router};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};
use crate::api::{admins, aliases, auth, domains, users};
use crate::security::csrf;

/// API Server configuration
pub struct ApiServer {
    state: AppState,
    static_dir: PathBuf,
    addr: String,
    sweep_interval: Duration,
}

impl ApiServer {
    pub fn new(state: AppState, static_dir: PathBuf, addr: String, sweep_interval: Duration) -> Self {
        Self {
            state,
            static_dir,
            addr,
            sweep_interval,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.static_dir)
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let sweeper = self.state.sessions.spawn_sweeper(self.sweep_interval);

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        info!("API server stopped");
        result
    }
}

/// All routes of the admin interface.
///
/// The resource endpoints take any method, including the non-standard
/// `UPDATE`, and dispatch on it themselves.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let protected_routes = Router::new()
        .route("/", any(handlers::root))
        .route("/api/domains/", any(domains::handle))
        .route("/api/domains/*rest", any(domains::handle))
        .route("/api/users", any(users::handle))
        .route("/api/users/", any(users::handle))
        .route("/api/users/*rest", any(users::handle))
        .route("/api/aliases/", any(aliases::handle))
        .route("/api/aliases/*rest", any(aliases::handle))
        .route("/api/admins/", any(admins::handle))
        .route("/api/admins/*rest", any(admins::handle))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::login_required,
        ));

    Router::new()
        .route("/login", any(handlers::login))
        .route("/logout", any(handlers::logout))
        .merge(protected_routes)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(state.clone(), csrf::protect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
