//! Utility modules
//!
//! - [`validate`]: names, mail addresses and passwords

pub mod validate;

pub use validate::{email_valid, ValidationError};
