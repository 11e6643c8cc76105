//! `persistent_logins` table access.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::store::{InsertOutcome, RotateOutcome, TokenStore};
use super::token::PersistentToken;

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get(&self, series: &str) -> Result<Option<PersistentToken>> {
        let query = r"
            SELECT series, username, token_hash,
                   EXTRACT(EPOCH FROM last_used)::bigint AS last_used_unix
            FROM persistent_logins
            WHERE series = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(series)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup remember-me series")?;

        Ok(row.map(|row| PersistentToken {
            series: row.get("series"),
            username: row.get("username"),
            token_hash: row.get("token_hash"),
            last_used_unix: row.get("last_used_unix"),
        }))
    }

    async fn insert(&self, token: &PersistentToken) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO persistent_logins (series, username, token_hash, last_used)
            VALUES ($1, $2, $3, to_timestamp($4))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&token.series)
            .bind(&token.username)
            .bind(&token.token_hash)
            .bind(token.last_used_unix as f64)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::SeriesTaken),
            Err(err) => Err(err).context("failed to insert remember-me series"),
        }
    }

    async fn update_token(
        &self,
        series: &str,
        expected_hash: &[u8],
        new_hash: &[u8],
        last_used_unix: i64,
    ) -> Result<RotateOutcome> {
        // Conditioned on the previous digest: a concurrent rotation makes this a no-op.
        let query = r"
            UPDATE persistent_logins
            SET token_hash = $3, last_used = to_timestamp($4)
            WHERE series = $1 AND token_hash = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(series)
            .bind(expected_hash)
            .bind(new_hash)
            .bind(last_used_unix as f64)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate remember-me token")?;

        if result.rows_affected() == 1 {
            Ok(RotateOutcome::Rotated)
        } else {
            Ok(RotateOutcome::Conflict)
        }
    }

    async fn delete(&self, series: &str) -> Result<()> {
        let query = "DELETE FROM persistent_logins WHERE series = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(series)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete remember-me series")?;
        Ok(())
    }

    async fn delete_all_for_user(&self, username: &str) -> Result<u64> {
        let query = "DELETE FROM persistent_logins WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete remember-me series for user")?;
        Ok(result.rows_affected())
    }

    async fn delete_last_used_before(&self, cutoff_unix: i64) -> Result<u64> {
        let query = "DELETE FROM persistent_logins WHERE last_used < to_timestamp($1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(cutoff_unix as f64)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired remember-me series")?;
        Ok(result.rows_affected())
    }
}
