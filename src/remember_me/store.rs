//! Token store abstraction keyed by series.
//!
//! Implementations must make `update_token` a compare-and-swap on the previous
//! token digest so that two requests racing with the same cookie cannot both
//! rotate the series.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::token::PersistentToken;

/// Outcome of inserting a new series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    SeriesTaken,
}

/// Outcome of a compare-and-swap rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// The row was missing or held a different digest than expected.
    Conflict,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, series: &str) -> Result<Option<PersistentToken>>;

    async fn insert(&self, token: &PersistentToken) -> Result<InsertOutcome>;

    async fn update_token(
        &self,
        series: &str,
        expected_hash: &[u8],
        new_hash: &[u8],
        last_used_unix: i64,
    ) -> Result<RotateOutcome>;

    /// Delete one series. Deleting a missing series is not an error.
    async fn delete(&self, series: &str) -> Result<()>;

    /// Delete every series owned by `username`, returning how many were removed.
    async fn delete_all_for_user(&self, username: &str) -> Result<u64>;

    /// Delete every series last used before `cutoff_unix`.
    async fn delete_last_used_before(&self, cutoff_unix: i64) -> Result<u64>;
}

/// Process-local store; state is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, PersistentToken>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, series: &str) -> Result<Option<PersistentToken>> {
        Ok(self.tokens.lock().await.get(series).cloned())
    }

    async fn insert(&self, token: &PersistentToken) -> Result<InsertOutcome> {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(&token.series) {
            return Ok(InsertOutcome::SeriesTaken);
        }
        tokens.insert(token.series.clone(), token.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update_token(
        &self,
        series: &str,
        expected_hash: &[u8],
        new_hash: &[u8],
        last_used_unix: i64,
    ) -> Result<RotateOutcome> {
        let mut tokens = self.tokens.lock().await;
        match tokens.get_mut(series) {
            Some(record) if record.token_hash == expected_hash => {
                record.token_hash = new_hash.to_vec();
                record.last_used_unix = last_used_unix;
                Ok(RotateOutcome::Rotated)
            }
            _ => Ok(RotateOutcome::Conflict),
        }
    }

    async fn delete(&self, series: &str) -> Result<()> {
        self.tokens.lock().await.remove(series);
        Ok(())
    }

    async fn delete_all_for_user(&self, username: &str) -> Result<u64> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, record| record.username != username);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_last_used_before(&self, cutoff_unix: i64) -> Result<u64> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, record| record.last_used_unix >= cutoff_unix);
        Ok((before - tokens.len()) as u64)
    }
}
