use thiserror::Error;

use crate::utils::validate::ValidationError;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),
}

impl AdminError {
    /// Errors caused by the request content rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AdminError::Invalid(_) | AdminError::NotFound(_) | AdminError::Conflict(_)
        )
    }

    /// Map a unique-constraint violation to `Conflict`, keep everything else.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AdminError::Conflict(what.to_string())
            }
            _ => AdminError::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
