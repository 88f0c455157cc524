//! Virtual domains, mailboxes and aliases
//!
//! The three tables follow the usual Postfix/Dovecot virtual mail layout:
//! `virtual_domains`, `virtual_users` (the mailboxes, with a Dovecot
//! password scheme prefix on the hash) and `virtual_aliases`.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::error::{AdminError, Result};
use crate::security::auth::hash_password;
use crate::utils::validate::{domain_name_valid, email_valid, parse_mail_parts};

/// Hash a mailbox password in a format Dovecot understands.
pub fn dovecot_hash(password: &str) -> Result<String> {
    Ok(format!("{{ARGON2ID}}{}", hash_password(password)?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualUser {
    #[serde(rename = "DomainID")]
    pub domain_id: i64,
    #[serde(rename = "Mail")]
    pub mail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    #[serde(rename = "DomainID")]
    pub domain_id: i64,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Dest")]
    pub dest: String,
}

/// One address in the merged user listing.
///
/// Addresses that only exist as alias sources have no mailbox data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserListing {
    #[serde(rename = "VirtualUser")]
    pub virtual_user: Option<VirtualUser>,
    #[serde(rename = "VirtualUserID")]
    pub virtual_user_id: Option<i64>,
    #[serde(rename = "AliasFor")]
    pub alias_for: BTreeMap<i64, Alias>,
}

impl UserListing {
    fn for_mailbox(id: i64, user: VirtualUser) -> Self {
        Self {
            virtual_user: Some(user),
            virtual_user_id: Some(id),
            alias_for: BTreeMap::new(),
        }
    }
}

/// Data access for the virtual mail tables
#[derive(Clone)]
pub struct MailDb {
    db: SqlitePool,
}

impl MailDb {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Create the mail tables
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS virtual_domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS virtual_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain_id INTEGER NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS virtual_aliases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                destination TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn add_domain(&self, name: &str) -> Result<i64> {
        domain_name_valid(name)?;

        let result = sqlx::query("INSERT INTO virtual_domains (name) VALUES (?)")
            .bind(name)
            .execute(&self.db)
            .await
            .map_err(|e| AdminError::from_insert(e, &format!("domain \"{}\"", name)))?;

        let id = result.last_insert_rowid();
        info!(domain_name = name, domain_id = id, "Added new virtual domain");
        Ok(id)
    }

    pub async fn delete_domain(&self, domain_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM virtual_domains WHERE id = ?")
            .bind(domain_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() != 1 {
            warn!(domain_id, "Domain for delete not found");
        } else {
            info!(domain_id, "Deleted domain");
        }
        Ok(())
    }

    pub async fn domain_id(&self, name: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM virtual_domains WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(id)
    }

    pub async fn domain_name(&self, domain_id: i64) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT name FROM virtual_domains WHERE id = ?")
            .bind(domain_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("domain id {}", domain_id)))
    }

    /// Local and domain part of a mailbox.
    pub async fn user_name(&self, user_id: i64) -> Result<(String, String)> {
        let email = sqlx::query_scalar::<_, String>("SELECT email FROM virtual_users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("user id {}", user_id)))?;

        let (local, domain) = parse_mail_parts(&email)?;
        Ok((local.to_string(), domain.to_string()))
    }

    /// Domain id for the domain part of `email`, unknown domains are an error.
    async fn owning_domain(&self, email: &str) -> Result<i64> {
        let (_, domain) = parse_mail_parts(email)?;
        self.domain_id(domain)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("domain \"{}\"", domain)))
    }

    pub async fn add_user(&self, email: &str, password: &str) -> Result<i64> {
        email_valid(email)?;
        let domain_id = self.owning_domain(email).await?;
        let password_hash = dovecot_hash(password)?;

        let result =
            sqlx::query("INSERT INTO virtual_users (domain_id, email, password) VALUES (?, ?, ?)")
                .bind(domain_id)
                .bind(email)
                .bind(&password_hash)
                .execute(&self.db)
                .await
                .map_err(|e| AdminError::from_insert(e, &format!("mail \"{}\"", email)))?;

        info!(email, "Added new email");
        Ok(result.last_insert_rowid())
    }

    pub async fn change_user_password(&self, user_id: i64, password: &str) -> Result<()> {
        let password_hash = dovecot_hash(password)?;

        let result = sqlx::query("UPDATE virtual_users SET password = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() != 1 {
            warn!(user_id, "Update of email failed: email not found in virtual_users");
            return Err(AdminError::NotFound(format!(
                "Update password failed: email id \"{}\" not found in virtual_users",
                user_id
            )));
        }
        info!(user_id, "Changed email password");
        Ok(())
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM virtual_users WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() != 1 {
            warn!(user_id, "Email for delete not found");
        } else {
            info!(user_id, "Deleted email");
        }
        Ok(())
    }

    /// Add an alias. The source may be a catch-all (`@domain`), the
    /// destination must be a valid mailbox address.
    pub async fn add_alias(&self, source: &str, dest: &str) -> Result<i64> {
        parse_mail_parts(source)?;
        email_valid(dest)?;
        let domain_id = self.owning_domain(source).await?;

        let result = sqlx::query(
            "INSERT INTO virtual_aliases (domain_id, source, destination) VALUES (?, ?, ?)",
        )
        .bind(domain_id)
        .bind(source)
        .bind(dest)
        .execute(&self.db)
        .await
        .map_err(|e| AdminError::from_insert(e, &format!("alias \"{}\"", source)))?;

        let id = result.last_insert_rowid();
        info!(source, dest, alias_id = id, "Added new alias");
        Ok(id)
    }

    pub async fn delete_alias(&self, alias_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM virtual_aliases WHERE id = ?")
            .bind(alias_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() != 1 {
            warn!(alias_id, "alias not found in virtual_aliases");
        } else {
            info!(alias_id, "Deleted alias");
        }
        Ok(())
    }

    pub async fn list_domains(&self) -> Result<BTreeMap<i64, String>> {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM virtual_domains")
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// Mailboxes, optionally restricted to one domain.
    pub async fn list_users(&self, domain_id: Option<i64>) -> Result<BTreeMap<i64, VirtualUser>> {
        let rows = match domain_id {
            None => {
                sqlx::query_as::<_, (i64, String, i64)>(
                    "SELECT id, email, domain_id FROM virtual_users",
                )
                .fetch_all(&self.db)
                .await?
            }
            Some(domain_id) => {
                sqlx::query_as::<_, (i64, String, i64)>(
                    "SELECT id, email, domain_id FROM virtual_users WHERE domain_id = ?",
                )
                .bind(domain_id)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(id, mail, domain_id)| (id, VirtualUser { domain_id, mail }))
            .collect())
    }

    /// Aliases, optionally restricted to one domain.
    pub async fn list_aliases(&self, domain_id: Option<i64>) -> Result<BTreeMap<i64, Alias>> {
        let rows = match domain_id {
            None => {
                sqlx::query_as::<_, (i64, i64, String, String)>(
                    "SELECT id, domain_id, source, destination FROM virtual_aliases",
                )
                .fetch_all(&self.db)
                .await?
            }
            Some(domain_id) => {
                sqlx::query_as::<_, (i64, i64, String, String)>(
                    "SELECT id, domain_id, source, destination FROM virtual_aliases WHERE domain_id = ?",
                )
                .bind(domain_id)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(id, domain_id, source, dest)| {
                (
                    id,
                    Alias {
                        domain_id,
                        source,
                        dest,
                    },
                )
            })
            .collect())
    }

    /// Merged view of mailboxes and the aliases whose source is that address.
    ///
    /// Both queries run concurrently and both finish before either result is
    /// inspected, so a failure on one side never leaves a partial map.
    pub async fn list_all_users(&self, domain_id: Option<i64>) -> Result<HashMap<String, UserListing>> {
        let (users, aliases) = tokio::join!(self.list_users(domain_id), self.list_aliases(domain_id));
        let users = users?;
        let aliases = aliases?;

        merge_listing(users, aliases)
    }
}

fn merge_listing(
    users: BTreeMap<i64, VirtualUser>,
    aliases: BTreeMap<i64, Alias>,
) -> Result<HashMap<String, UserListing>> {
    let mut listing: HashMap<String, UserListing> = users
        .into_iter()
        .map(|(id, user)| (user.mail.clone(), UserListing::for_mailbox(id, user)))
        .collect();

    for (alias_id, alias) in aliases {
        let local = match parse_mail_parts(&alias.source) {
            Ok((local, _)) => local,
            Err(e) => {
                warn!(
                    source = %alias.source,
                    dest = %alias.dest,
                    virtual_alias_id = alias_id,
                    "Invalid email in virtual_aliases table."
                );
                return Err(e.into());
            }
        };
        // catch-all
        if local.is_empty() {
            continue;
        }

        listing
            .entry(alias.source.clone())
            .or_default()
            .alias_for
            .insert(alias_id, alias);
    }

    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_db() -> MailDb {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = MailDb::new(pool);
        db.init().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_domain_round_trip() {
        let db = test_db().await;
        let id = db.add_domain("example.com").await.unwrap();
        assert!(id > 0);

        let domains = db.list_domains().await.unwrap();
        assert_eq!(domains.get(&id).map(String::as_str), Some("example.com"));
        assert_eq!(db.domain_name(id).await.unwrap(), "example.com");
        assert_eq!(db.domain_id("example.com").await.unwrap(), Some(id));

        db.delete_domain(id).await.unwrap();
        assert!(db.list_domains().await.unwrap().is_empty());
        // missing rows only warn
        db.delete_domain(id).await.unwrap();
        assert!(matches!(db.domain_name(id).await, Err(AdminError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_domain_not_written() {
        let db = test_db().await;
        let long = "x".repeat(51);
        for name in ["", "a/b", "a..b", "a\\b", long.as_str()] {
            assert!(matches!(db.add_domain(name).await, Err(AdminError::Invalid(_))));
        }
        assert!(db.list_domains().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_domain_conflict() {
        let db = test_db().await;
        db.add_domain("example.com").await.unwrap();
        let err = db.add_domain("example.com").await.unwrap_err();
        assert!(matches!(err, AdminError::Conflict(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let db = test_db().await;
        let domain_id = db.add_domain("example.com").await.unwrap();
        let user_id = db.add_user("alice@example.com", "secret1").await.unwrap();

        let users = db.list_users(Some(domain_id)).await.unwrap();
        assert_eq!(users[&user_id].mail, "alice@example.com");
        assert_eq!(
            db.user_name(user_id).await.unwrap(),
            ("alice".to_string(), "example.com".to_string())
        );

        let stored: String = sqlx::query_scalar("SELECT password FROM virtual_users WHERE id = ?")
            .bind(user_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(stored.starts_with("{ARGON2ID}$argon2id$"));

        db.change_user_password(user_id, "secret2").await.unwrap();
        assert!(matches!(
            db.change_user_password(9999, "secret2").await,
            Err(AdminError::NotFound(_))
        ));

        db.delete_user(user_id).await.unwrap();
        assert!(db.list_users(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_unknown_domain() {
        let db = test_db().await;
        let err = db.add_user("alice@example.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AdminError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_alias_validation() {
        let db = test_db().await;
        db.add_domain("spam.example.com").await.unwrap();

        let err = db.add_alias("@spam.example.com", "notanemail").await.unwrap_err();
        assert!(matches!(err, AdminError::Invalid(_)));

        let id = db
            .add_alias("@spam.example.com", "trash@example.org")
            .await
            .unwrap();
        let aliases = db.list_aliases(None).await.unwrap();
        assert_eq!(aliases[&id].source, "@spam.example.com");

        db.delete_alias(id).await.unwrap();
        db.delete_alias(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_all_users_merges_by_source() {
        let db = test_db().await;
        let domain_id = db.add_domain("example.com").await.unwrap();
        let alice = db.add_user("alice@example.com", "secret1").await.unwrap();
        let a1 = db
            .add_alias("alice@example.com", "backup@example.org")
            .await
            .unwrap();
        let a2 = db
            .add_alias("bob@example.com", "alice@example.com")
            .await
            .unwrap();
        db.add_alias("@example.com", "alice@example.com").await.unwrap();

        let listing = db.list_all_users(None).await.unwrap();
        assert_eq!(listing.len(), 2);

        let entry = &listing["alice@example.com"];
        assert_eq!(entry.virtual_user_id, Some(alice));
        assert_eq!(entry.virtual_user.as_ref().map(|u| u.domain_id), Some(domain_id));
        assert_eq!(entry.alias_for.keys().copied().collect::<Vec<_>>(), vec![a1]);

        let alias_only = &listing["bob@example.com"];
        assert!(alias_only.virtual_user.is_none());
        assert!(alias_only.virtual_user_id.is_none());
        assert!(alias_only.alias_for.contains_key(&a2));
    }

    #[tokio::test]
    async fn test_list_all_users_fails_when_one_side_fails() {
        let db = test_db().await;
        db.add_domain("example.com").await.unwrap();
        db.add_user("alice@example.com", "secret1").await.unwrap();
        sqlx::query("DROP TABLE virtual_aliases")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            db.list_all_users(None).await,
            Err(AdminError::Database(_))
        ));
    }

    #[test]
    fn test_merge_rejects_unparsable_source() {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            1,
            Alias {
                domain_id: 1,
                source: "broken".to_string(),
                dest: "a@example.com".to_string(),
            },
        );
        assert!(matches!(
            merge_listing(BTreeMap::new(), aliases),
            Err(AdminError::Invalid(_))
        ));
    }

    #[test]
    fn test_listing_json_shape() {
        let entry = UserListing::for_mailbox(
            3,
            VirtualUser {
                domain_id: 1,
                mail: "alice@example.com".to_string(),
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["VirtualUserID"], 3);
        assert_eq!(json["VirtualUser"]["Mail"], "alice@example.com");
        assert!(json["AliasFor"].as_object().unwrap().is_empty());
    }
}
