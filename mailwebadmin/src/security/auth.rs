//! Administrator accounts
//!
//! Stores the accounts that may log into the web interface. Passwords are
//! hashed with Argon2 and never stored in plain text.
//!
//! # Usage
//! ```no_run
//! use mailwebadmin::security::{AdminUsers, LoginOutcome};
//! use sqlx::SqlitePool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePool::connect("sqlite://admins.db").await?;
//! let admins = AdminUsers::new(pool);
//! admins.init().await?;
//!
//! admins.insert("root", "secret123").await?;
//!
//! match admins.validate("root", "secret123").await? {
//!     LoginOutcome::Authenticated(id) => println!("admin {id} logged in"),
//!     LoginOutcome::UnknownUser | LoginOutcome::WrongPassword => println!("login failed"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AdminError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Result of checking a username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(i64),
    UnknownUser,
    WrongPassword,
}

/// Hash a password with Argon2id, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AdminError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AdminError::PasswordHash(format!("stored hash is malformed: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Administrator account store
#[derive(Clone)]
pub struct AdminUsers {
    db: SqlitePool,
}

impl AdminUsers {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create the accounts table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admin_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Add a new administrator, returns its id
    pub async fn insert(&self, username: &str, password: &str) -> Result<i64> {
        let password_hash = hash_password(password)?;

        let result = sqlx::query(
            r#"
            INSERT INTO admin_users (username, password_hash, created_at)
            VALUES (?, ?, datetime('now'))
            "#,
        )
        .bind(username)
        .bind(&password_hash)
        .execute(&self.db)
        .await
        .map_err(|e| AdminError::from_insert(e, &format!("admin user \"{}\"", username)))?;

        let id = result.last_insert_rowid();
        info!(username, admin_id = id, "Added admin user");
        Ok(id)
    }

    /// Check credentials.
    ///
    /// Unknown users and wrong passwords are distinct outcomes here, callers
    /// facing the network must not reveal the difference.
    pub async fn validate(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        debug!("Login attempt for {}", username);

        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM admin_users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        let Some((id, stored_hash)) = row else {
            return Ok(LoginOutcome::UnknownUser);
        };

        if !verify_password(password, &stored_hash)? {
            return Ok(LoginOutcome::WrongPassword);
        }

        sqlx::query("UPDATE admin_users SET last_login = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(LoginOutcome::Authenticated(id))
    }

    /// All usernames, sorted
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let users = sqlx::query_scalar::<_, String>(
            "SELECT username FROM admin_users ORDER BY username",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    pub async fn user_id(&self, username: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM admin_users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;

        Ok(id)
    }

    pub async fn username(&self, id: i64) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT username FROM admin_users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(name)
    }

    /// Replace the password, returns false if the user does not exist
    pub async fn update_password(&self, username: &str, password: &str) -> Result<bool> {
        let password_hash = hash_password(password)?;

        let result = sqlx::query("UPDATE admin_users SET password_hash = ? WHERE username = ?")
            .bind(&password_hash)
            .bind(username)
            .execute(&self.db)
            .await?;

        let updated = result.rows_affected() == 1;
        if updated {
            info!(username, "Changed admin password");
        } else {
            warn!(username, "Password change for unknown admin user");
        }
        Ok(updated)
    }

    /// Delete an administrator, returns false if the user does not exist
    pub async fn delete(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM admin_users WHERE username = ?")
            .bind(username)
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected() == 1;
        if deleted {
            info!(username, "Deleted admin user");
        } else {
            warn!(username, "Admin user for delete not found");
        }
        Ok(deleted)
    }
}
