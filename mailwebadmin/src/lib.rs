//! mailwebadmin: web administration for a virtual mail server
//!
//! Manages the virtual domains, mailboxes and aliases a Postfix/Dovecot
//! setup reads from its database, plus the admin accounts of the web
//! interface itself.
//!
//! # Features
//!
//! - **JSON API**: domains, users, aliases and admins under `/api/`
//! - **Sessions**: encrypted cookies backed by a session table, remember-me
//! - **CSRF**: masked per-request tokens for every mutating request
//! - **Cleanup**: mail directories of deleted domains and users are zipped
//!   to a backup directory and removed in the background
//!
//! # Example
//!
//! ```no_run
//! use mailwebadmin::admin::{CleanupPolicy, TokioJobQueue};
//! use mailwebadmin::api::{ApiServer, AppState};
//! use mailwebadmin::config::Config;
//! use mailwebadmin::security::{keys, AdminUsers, SessionController};
//! use mailwebadmin::storage::{self, MailDb};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config")?;
//!     let pool = storage::connect(&config.database).await?;
//!     let key = keys::active_cookie_key(&keys::read_or_create_keys(&config.keys_path())?)?;
//!
//!     let state = AppState::new(
//!         MailDb::new(pool.clone()),
//!         AdminUsers::new(pool.clone()),
//!         SessionController::new(pool, config.session_lifespan),
//!         Arc::new(TokioJobQueue::new(CleanupPolicy {
//!             maildir: config.maildir.clone(),
//!             backup: config.backup.clone(),
//!         })),
//!         config.delete,
//!         key,
//!     );
//!
//!     let server = ApiServer::new(
//!         state,
//!         config.static_dir.clone(),
//!         config.listen_addr(),
//!         config.invalid_keys_interval,
//!     );
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`api`]: HTTP routes, dispatch and middleware
//! - [`admin`]: Mail directory backup and removal
//! - [`storage`]: Domains, mailboxes and aliases
//! - [`security`]: Admin accounts, sessions, CSRF and key material
//! - [`utils`]: Input validation

pub mod admin;
pub mod api;
pub mod config;
pub mod error;
pub mod security;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AdminError, Result};
