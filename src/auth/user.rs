use chrono::{NaiveDateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

use super::{Page, Permission, Role};

pub const ALL_SENTINEL: &str = "All";
pub const NONE_SENTINEL: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChildLink {
    All,
    None,
    Child(String),
}

impl ChildLink {
    pub fn parse(value: &str) -> Self {
        match value {
            ALL_SENTINEL => ChildLink::All,
            NONE_SENTINEL | "" => ChildLink::None,
            name => ChildLink::Child(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChildLink::All => ALL_SENTINEL,
            ChildLink::None => NONE_SENTINEL,
            ChildLink::Child(name) => name,
        }
    }

    pub fn child_name(&self) -> Option<&str> {
        match self {
            ChildLink::Child(name) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for ChildLink {
    fn from(value: String) -> Self {
        ChildLink::parse(&value)
    }
}

impl From<ChildLink> for String {
    fn from(link: ChildLink) -> Self {
        link.as_str().to_string()
    }
}

impl fmt::Display for ChildLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub role: Role,
    pub child_link: ChildLink,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub username: Option<String>,
    pub role: Option<String>,
    pub child_link: Option<String>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user.role.unwrap_or_default();
        Ok(Self {
            username: user.username.unwrap_or_default(),
            role: role
                .parse::<Role>()
                .map_err(|e| AppError::Internal(e.to_string()))?,
            child_link: ChildLink::parse(user.child_link.as_deref().unwrap_or(ALL_SENTINEL)),
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "Role '{}' may not perform this action",
                self.role
            )))
        }
    }

    pub fn require_any_permission(&self, permissions: &[Permission]) -> Result<(), AppError> {
        if permissions.iter().any(|p| self.role.has_permission(*p)) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permissions = ?permissions,
                "Permission denied (require any)"
            );
            Err(AppError::Authorization(format!(
                "Role '{}' may not perform this action",
                self.role
            )))
        }
    }

    pub fn visible_pages(&self) -> &'static [Page] {
        self.role.visible_pages()
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub username: String,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            username: session.username.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session
                .created_at
                .unwrap_or_else(|| Utc::now().naive_utc()),
            expires_at: session.expires_at.unwrap_or_default(),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}
