//! Security module
//!
//! - [`auth`]: administrator accounts and password hashing
//! - [`keys`]: cookie key material
//! - [`session`]: cookie backed login sessions
//! - [`csrf`]: CSRF token middleware

pub mod auth;
pub mod csrf;
pub mod keys;
pub mod session;

pub use auth::{AdminUsers, LoginOutcome};
pub use csrf::CsrfToken;
pub use keys::KeyPair;
pub use session::{Session, SessionController, SessionError, SessionValues};
