//! HTTP interface of mailwebadmin
//!
//! JSON endpoints for domains, mailboxes, aliases and admins behind a
//! session login, plus the login/logout handlers.

pub mod admins;
pub mod aliases;
pub mod auth;
pub mod dispatch;
pub mod domains;
pub mod error;
pub mod handlers;
pub mod server;
pub mod users;

pub use error::ApiError;
pub use handlers::AppState;
pub use server::{router, ApiServer};
