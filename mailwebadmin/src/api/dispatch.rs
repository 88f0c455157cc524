//! Method and path based dispatch for the resource endpoints
//!
//! Every resource endpoint accepts the same small set of methods. The
//! request path may carry an identifier; together with the method it
//! decides the action.
//!
//! | Method | no id  | id     |
//! |--------|--------|--------|
//! | GET    | List   | 400    |
//! | POST   | Create | 400    |
//! | DELETE | 400    | Delete |
//! | UPDATE | 400    | Update |

use axum::http::Method;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

use super::error::ApiError;

/// Non-standard method used for password changes.
pub const UPDATE_METHOD: &str = "UPDATE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAction<Id> {
    List,
    Create,
    Update(Id),
    Delete(Id),
    /// Method and id don't fit together, the message goes to the client.
    Invalid(String),
}

pub struct Resource {
    /// Path shown in error messages.
    pub path: &'static str,
    pattern: &'static str,
    regex: OnceLock<Regex>,
    updatable: bool,
}

pub static DOMAINS: Resource = Resource::new("/api/domains/", r"^/api/domains/((\d+)/?)?$", false);
pub static USERS: Resource = Resource::new("/api/users/", r"^/api/users(/(\d+)/?)?$", true);
pub static ALIASES: Resource = Resource::new("/api/aliases/", r"^/api/aliases/((\d+)/?)?$", false);
pub static ADMINS: Resource = Resource::new("/api/admins/", r"^/api/admins/(([^/]+)/?)?$", true);

impl Resource {
    const fn new(path: &'static str, pattern: &'static str, updatable: bool) -> Self {
        Self {
            path,
            pattern,
            regex: OnceLock::new(),
            updatable,
        }
    }

    fn regex(&self) -> &Regex {
        self.regex
            .get_or_init(|| Regex::new(self.pattern).expect("resource pattern is valid"))
    }

    /// Identifier in `path`, `None` if the path names the collection.
    ///
    /// The identifier is percent-decoded. Paths outside the resource, ids
    /// that are not UTF-8 once decoded and unparsable ids are `NotFound`.
    pub fn parse_id<Id: FromStr>(&self, path: &str) -> Result<Option<Id>, ApiError> {
        let caps = self.regex().captures(path).ok_or(ApiError::NotFound)?;
        let Some(id) = caps.get(2) else {
            return Ok(None);
        };
        let id = percent_decode_str(id.as_str())
            .decode_utf8()
            .map_err(|_| ApiError::NotFound)?;
        id.parse().map(Some).map_err(|_| ApiError::NotFound)
    }

    pub fn action<Id: FromStr>(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<ResourceAction<Id>, ApiError> {
        let id = self.parse_id(path)?;

        Ok(match (method.as_str(), id) {
            ("GET", None) => ResourceAction::List,
            ("GET", Some(_)) => {
                ResourceAction::Invalid(format!("Invalid GET request. Must be GET {}", self.path))
            }
            ("POST", None) => ResourceAction::Create,
            ("POST", Some(_)) => {
                ResourceAction::Invalid(format!("Invalid POST request to {}.", self.path))
            }
            ("DELETE", Some(id)) => ResourceAction::Delete(id),
            ("DELETE", None) => ResourceAction::Invalid(format!(
                "Invalid DELETE request to {}: No id given.",
                self.path
            )),
            (UPDATE_METHOD, Some(id)) if self.updatable => ResourceAction::Update(id),
            (UPDATE_METHOD, None) if self.updatable => ResourceAction::Invalid(format!(
                "Invalid UPDATE request to {}: No id given.",
                self.path
            )),
            (other, _) => {
                ResourceAction::Invalid(format!("Invalid method for {}: {}", self.path, other))
            }
        })
    }
}
