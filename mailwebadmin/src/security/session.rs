//! Authenticated admin sessions
//!
//! A session lives in two places: the `admin_sessions` table holds the key,
//! the owning admin and the expiry; the browser holds a private (encrypted
//! and authenticated) cookie with the key and the session values.
//!
//! A request is authenticated only if the cookie decrypts, the key inside
//! it is well formed and the key is present and unexpired in the table.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use cookie::time::Duration as CookieDuration;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AdminError, Result};

pub const SESSION_COOKIE: &str = "mailwebadmin-session";

const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request carries no authenticated session")]
    NotAuthSession,

    #[error("session key not found")]
    KeyNotFound,

    #[error("session key is malformed")]
    InvalidKey,

    #[error(transparent)]
    Store(#[from] AdminError),
}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        SessionError::Store(AdminError::Database(err))
    }
}

/// Values stored alongside the session key in the cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValues {
    #[serde(rename = "remember-me", default, skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CookiePayload {
    key: String,
    #[serde(default)]
    values: SessionValues,
}

/// An authenticated session.
///
/// `max_age` follows cookie semantics: positive is a lifetime in seconds,
/// zero keeps the cookie until the browser closes, negative removes it.
#[derive(Debug, Clone)]
pub struct Session {
    key: String,
    admin_id: i64,
    pub values: SessionValues,
    max_age: i64,
}

impl Session {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn admin_id(&self) -> i64 {
        self.admin_id
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: i64) {
        self.max_age = max_age;
    }

    /// Apply the remember-me flag: without it the cookie ends with the browser session.
    pub fn apply_remember_me(&mut self) {
        match self.values.remember_me {
            None => info!(admin_id = self.admin_id, "Session carries no remember-me flag"),
            Some(false) => self.max_age = 0,
            Some(true) => {}
        }
    }

    /// Write the session cookie into the jar.
    pub fn save(&self, jar: &PrivateCookieJar) -> Result<PrivateCookieJar> {
        if self.max_age < 0 {
            return Ok(jar
                .clone()
                .remove(Cookie::build(SESSION_COOKIE).path("/").build()));
        }

        let payload = serde_json::to_string(&CookiePayload {
            key: self.key.clone(),
            values: self.values.clone(),
        })?;

        let mut cookie = Cookie::build((SESSION_COOKIE, payload))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        if self.max_age > 0 {
            cookie = cookie.max_age(CookieDuration::seconds(self.max_age));
        }
        Ok(jar.clone().add(cookie.build()))
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn key_well_formed(key: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(key)
        .map(|bytes| bytes.len() == KEY_LEN)
        .unwrap_or(false)
}

/// Session store backed by the `admin_sessions` table
#[derive(Clone)]
pub struct SessionController {
    db: SqlitePool,
    lifespan: Duration,
}

impl SessionController {
    pub fn new(db: SqlitePool, lifespan: Duration) -> Self {
        Self { db, lifespan }
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admin_sessions (
                session_key TEXT PRIMARY KEY,
                admin_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                valid_until INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Start a new session for the admin with the default lifespan.
    pub async fn create_auth_session(&self, admin_id: i64) -> Result<Session> {
        let key = generate_key();
        let now = Utc::now().timestamp();
        let lifespan = i64::try_from(self.lifespan.as_secs()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO admin_sessions (session_key, admin_id, created_at, valid_until)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&key)
        .bind(admin_id)
        .bind(now)
        .bind(now.saturating_add(lifespan))
        .execute(&self.db)
        .await?;

        info!(admin_id, "Created admin session");
        Ok(Session {
            key,
            admin_id,
            values: SessionValues::default(),
            max_age: lifespan,
        })
    }

    /// Resolve the session carried by the request cookies.
    pub async fn validate_session(
        &self,
        jar: &PrivateCookieJar,
    ) -> std::result::Result<Session, SessionError> {
        let cookie = jar.get(SESSION_COOKIE).ok_or(SessionError::NotAuthSession)?;
        let payload: CookiePayload =
            serde_json::from_str(cookie.value()).map_err(|_| SessionError::InvalidKey)?;
        if !key_well_formed(&payload.key) {
            return Err(SessionError::InvalidKey);
        }

        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT admin_id, valid_until FROM admin_sessions WHERE session_key = ?",
        )
        .bind(&payload.key)
        .fetch_optional(&self.db)
        .await?;

        let Some((admin_id, valid_until)) = row else {
            return Err(SessionError::KeyNotFound);
        };
        let now = Utc::now().timestamp();
        if valid_until <= now {
            return Err(SessionError::KeyNotFound);
        }

        Ok(Session {
            key: payload.key,
            admin_id,
            values: payload.values,
            max_age: valid_until - now,
        })
    }

    /// Remove a single key, returns false if it was not stored.
    pub async fn delete_key(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE session_key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every session of an admin, used after password changes and deletes.
    pub async fn delete_entries_for_user(&self, admin_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE admin_id = ?")
            .bind(admin_id)
            .execute(&self.db)
            .await?;

        info!(admin_id, removed = result.rows_affected(), "Invalidated admin sessions");
        Ok(result.rows_affected())
    }

    /// Remove expired keys.
    pub async fn delete_invalid_keys(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE valid_until <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Sweep expired keys every `interval` for as long as the process runs.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let controller = self.clone();
        info!(sleep_time = ?interval, "Starting daemon to delete invalid keys");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match controller.delete_invalid_keys().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Deleted invalid session keys"),
                    Err(e) => error!("Failed to delete invalid session keys: {}", e),
                }
            }
        })
    }

    /// End a session: expire the cookie and drop the key from the store.
    ///
    /// Failing to delete the key is only logged; the cookie is gone either way.
    pub async fn end_session(&self, session: &mut Session, jar: &PrivateCookieJar) -> PrivateCookieJar {
        session.set_max_age(-1);
        let jar = match session.save(jar) {
            Ok(jar) => jar,
            Err(e) => {
                error!("Saving session failed: {}", e);
                jar.clone()
            }
        };

        match self.delete_key(session.key()).await {
            Ok(true) => info!(admin_id = session.admin_id(), "Admin logged out"),
            Ok(false) => warn!(admin_id = session.admin_id(), "Session key already gone on logout"),
            Err(e) => error!(
                admin_id = session.admin_id(),
                "Failed to delete session key, other clients with the same cookie stay logged in: {}",
                e
            ),
        }
        jar
    }
}
