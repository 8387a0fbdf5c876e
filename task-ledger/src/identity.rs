//! User accounts and credential checks.
//!
//! Roles only decide which view the presentation layer shows; every ledger
//! operation is available to any authenticated user.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::user;
use crate::store::{StoreError, UserStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// Error type for identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Unknown role '{0}'")]
    UnknownRole(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// A stored account. Only the credential digest is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_digest: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(username: &str, password: &str, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            password_digest: password_digest(username, password),
            role,
            created_at,
        }
    }
}

impl From<user::Model> for UserRecord {
    fn from(model: user::Model) -> Self {
        let role = model.role.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "User {} has unknown role '{}', treating as viewer",
                model.username,
                model.role
            );
            Role::Viewer
        });
        Self {
            username: model.username,
            password_digest: model.password_digest,
            role,
            created_at: model.created_at,
        }
    }
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    username: String,
    role: Role,
}

impl User {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Credentials of an account to create at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// Hex SHA-256 of `username:password`.
pub fn password_digest(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct Identity {
    users: Arc<dyn UserStore>,
}

impl Identity {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Returns the matching user, or `None` when the username is unknown or
    /// the password does not match.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, IdentityError> {
        let Some(record) = self.users.find_user(username).await? else {
            tracing::info!("Login attempt for unknown user {}", username);
            return Ok(None);
        };
        if record.password_digest != password_digest(username, password) {
            tracing::info!("Rejected login for {}", username);
            return Ok(None);
        }
        Ok(Some(User {
            username: record.username,
            role: record.role,
        }))
    }

    /// Creates the account, replacing the password and role of an existing one.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), IdentityError> {
        let record = UserRecord::new(username, password, role, Utc::now());
        self.users.put_user(record).await?;
        Ok(())
    }

    /// Registers the configured accounts.
    #[tracing::instrument(skip(self, accounts))]
    pub async fn seed(&self, accounts: &[Account]) -> Result<(), IdentityError> {
        for account in accounts {
            self.register(&account.username, &account.password, account.role)
                .await?;
        }
        tracing::debug!("Seeded {} accounts", accounts.len());
        Ok(())
    }
}
