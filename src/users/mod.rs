//! Principals and the user directories that resolve them.
//!
//! Usernames are normalized emails. The remember-me service only needs
//! [`PrincipalLoader`]; interactive login additionally needs the stored
//! password hash through [`CredentialStore`].

pub mod password;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{collections::HashMap, sync::OnceLock};
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roles::Role;

pub use postgres::PgUserDirectory;

/// Authenticated user context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    #[schema(value_type = Vec<String>)]
    pub roles: Vec<Role>,
    pub enabled: bool,
}

/// Principal plus the password hash used to verify an interactive login.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    pub principal: Principal,
    pub password_hash: String,
}

#[async_trait]
pub trait PrincipalLoader: Send + Sync {
    async fn load_principal(&self, username: &str) -> Result<Option<Principal>>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_username(username_normalized: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(username_normalized))
}

/// In-memory directory, used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, UserCredentials>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a user, hashing the password with Argon2.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    pub async fn add_user(
        &self,
        username: &str,
        password: &SecretString,
        roles: Vec<Role>,
    ) -> Result<Principal> {
        let password_hash = password::hash_password(password.expose_secret())?;
        let principal = Principal {
            user_id: Uuid::new_v4(),
            username: normalize_username(username),
            roles,
            enabled: true,
        };
        self.users.write().await.insert(
            principal.username.clone(),
            UserCredentials {
                principal: principal.clone(),
                password_hash,
            },
        );
        Ok(principal)
    }

    pub async fn set_enabled(&self, username: &str, enabled: bool) {
        if let Some(user) = self
            .users
            .write()
            .await
            .get_mut(&normalize_username(username))
        {
            user.principal.enabled = enabled;
        }
    }

    pub async fn remove_user(&self, username: &str) {
        self.users
            .write()
            .await
            .remove(&normalize_username(username));
    }
}

#[async_trait]
impl PrincipalLoader for MemoryUserDirectory {
    async fn load_principal(&self, username: &str) -> Result<Option<Principal>> {
        Ok(self
            .users
            .read()
            .await
            .get(&normalize_username(username))
            .map(|user| user.principal.clone()))
    }
}

#[async_trait]
impl CredentialStore for MemoryUserDirectory {
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        Ok(self
            .users
            .read()
            .await
            .get(&normalize_username(username))
            .cloned())
    }
}
