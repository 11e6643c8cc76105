//! `users` table access.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::{normalize_username, CredentialStore, Principal, PrincipalLoader, UserCredentials};
use crate::roles::Role;

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, username: &str) -> Result<Option<PgRow>> {
        let query = r"
            SELECT id, email, password_hash, roles, enabled
            FROM users
            WHERE email = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(normalize_username(username))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")
    }
}

fn principal_from_row(row: &PgRow) -> Principal {
    let roles: Vec<String> = row.get("roles");
    Principal {
        user_id: row.get("id"),
        username: row.get("email"),
        roles: roles.into_iter().map(Role::from).collect(),
        enabled: row.get("enabled"),
    }
}

#[async_trait]
impl PrincipalLoader for PgUserDirectory {
    async fn load_principal(&self, username: &str) -> Result<Option<Principal>> {
        Ok(self.fetch(username).await?.as_ref().map(principal_from_row))
    }
}

#[async_trait]
impl CredentialStore for PgUserDirectory {
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        Ok(self.fetch(username).await?.map(|row| UserCredentials {
            principal: principal_from_row(&row),
            password_hash: row.get("password_hash"),
        }))
    }
}
