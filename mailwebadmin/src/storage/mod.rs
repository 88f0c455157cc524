//! Mail data storage
//!
//! - [`mail_sql`]: virtual domains, mailboxes and aliases in SQLite

pub mod mail_sql;

pub use mail_sql::{Alias, MailDb, UserListing, VirtualUser};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Open the connection pool shared by all stores.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect(&config.url)
        .await?;

    info!(url = %config.url, "Connected to database");
    Ok(pool)
}
