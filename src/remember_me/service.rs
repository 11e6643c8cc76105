//! Issue, validate, and rotate remember-me grants.
//!
//! Flow Overview:
//! 1) `issue` after an interactive login with "remember me" ticked.
//! 2) `auto_login`/`authenticate` on a request that carries only the cookie:
//!    unknown series -> reject; digest mismatch -> revoke series (theft);
//!    idle too long -> revoke; otherwise load the user, then CAS-rotate the token.
//! 3) `invalidate` on logout, `invalidate_all` on revocation.

use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::cookie::decode_cookie_value;
use super::error::RememberMeError;
use super::store::{InsertOutcome, RotateOutcome, TokenStore};
use super::token::{generate_series, generate_token, hash_token, now_unix, IssuedToken, PersistentToken};
use crate::users::{Principal, PrincipalLoader};

const DEFAULT_TOKEN_VALIDITY_SECONDS: i64 = 14 * 24 * 60 * 60;
const SERIES_INSERT_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct RememberMeConfig {
    token_validity_seconds: i64,
    cookie_secure: bool,
}

impl Default for RememberMeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RememberMeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_validity_seconds: DEFAULT_TOKEN_VALIDITY_SECONDS,
            cookie_secure: true,
        }
    }

    #[must_use]
    pub fn with_token_validity_seconds(mut self, seconds: i64) -> Self {
        self.token_validity_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn token_validity_seconds(&self) -> i64 {
        self.token_validity_seconds
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

/// A successful silent login: who the caller is and the cookie to send back.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub principal: Principal,
    pub rotated: IssuedToken,
}

pub struct RememberMeTokenService {
    store: Arc<dyn TokenStore>,
    principals: Arc<dyn PrincipalLoader>,
    config: RememberMeConfig,
}

impl RememberMeTokenService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        principals: Arc<dyn PrincipalLoader>,
        config: RememberMeConfig,
    ) -> Self {
        Self {
            store,
            principals,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RememberMeConfig {
        &self.config
    }

    /// Start a new grant for `username`.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the row cannot be written and
    /// `TokenGeneration` if the OS random source fails.
    #[instrument(skip(self))]
    pub async fn issue(&self, username: &str) -> Result<IssuedToken, RememberMeError> {
        for _ in 0..SERIES_INSERT_ATTEMPTS {
            let series = generate_series()?;
            let token = generate_token()?;
            let record = PersistentToken::new(
                series.clone(),
                username.to_string(),
                hash_token(token.expose_secret()),
                now_unix(),
            );
            match self
                .store
                .insert(&record)
                .await
                .map_err(RememberMeError::StoreUnavailable)?
            {
                InsertOutcome::Inserted => {
                    debug!("issued remember-me series");
                    return Ok(IssuedToken::new(series, token));
                }
                InsertOutcome::SeriesTaken => {}
            }
        }

        Err(RememberMeError::StoreUnavailable(anyhow::anyhow!(
            "failed to generate unique remember-me series"
        )))
    }

    /// Decode a cookie value and authenticate with it.
    ///
    /// # Errors
    ///
    /// `MalformedCookie` plus everything [`Self::authenticate`] returns.
    pub async fn auto_login(&self, cookie_value: &str) -> Result<Authenticated, RememberMeError> {
        let (series, token) = decode_cookie_value(cookie_value)?;
        self.authenticate(&series, &token).await
    }

    /// Validate a presented `series:token` pair and rotate the token.
    ///
    /// # Errors
    ///
    /// See [`RememberMeError`]; every error means "not authenticated".
    #[instrument(skip(self, presented_token))]
    pub async fn authenticate(
        &self,
        series: &str,
        presented_token: &str,
    ) -> Result<Authenticated, RememberMeError> {
        let Some(record) = self
            .store
            .get(series)
            .await
            .map_err(RememberMeError::StoreUnavailable)?
        else {
            debug!("remember-me series not found");
            return Err(RememberMeError::UnknownSeries);
        };

        if !record.matches(presented_token) {
            warn!(
                security_event = "remember_me_token_reuse",
                username = %record.username,
                "stale remember-me token presented, revoking series"
            );
            self.revoke(series).await?;
            return Err(RememberMeError::TokenReuseDetected);
        }

        let now = now_unix();
        if record.is_expired(now, self.config.token_validity_seconds) {
            info!(username = %record.username, "remember-me grant expired");
            self.revoke(series).await?;
            return Err(RememberMeError::Expired);
        }

        // A failed lookup must leave the stored token untouched.
        let principal = match self
            .principals
            .load_principal(&record.username)
            .await
            .map_err(RememberMeError::StoreUnavailable)?
        {
            Some(principal) if principal.enabled => principal,
            Some(_) => {
                info!(username = %record.username, "remember-me login for disabled account");
                self.revoke(series).await?;
                return Err(RememberMeError::AccountDisabled);
            }
            None => {
                info!(username = %record.username, "remember-me login for unknown principal");
                self.revoke(series).await?;
                return Err(RememberMeError::PrincipalNotFound);
            }
        };

        let new_token = generate_token()?;
        let outcome = self
            .store
            .update_token(
                series,
                &record.token_hash,
                &hash_token(new_token.expose_secret()),
                now,
            )
            .await
            .map_err(RememberMeError::StoreUnavailable)?;

        if outcome == RotateOutcome::Conflict {
            // Another request rotated first; ours now holds a stale token.
            warn!(
                security_event = "remember_me_token_reuse",
                username = %record.username,
                "concurrent remember-me rotation, revoking series"
            );
            self.revoke(series).await?;
            return Err(RememberMeError::TokenReuseDetected);
        }

        debug!(username = %principal.username, "remember-me login succeeded");
        Ok(Authenticated {
            principal,
            rotated: IssuedToken::new(series.to_string(), new_token),
        })
    }

    /// Delete a single grant, e.g. on logout.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the delete fails.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, series: &str) -> Result<(), RememberMeError> {
        self.revoke(series).await
    }

    /// Delete every grant of `username`, e.g. after a credential change.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the delete fails.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self, username: &str) -> Result<u64, RememberMeError> {
        let removed = self
            .store
            .delete_all_for_user(username)
            .await
            .map_err(RememberMeError::StoreUnavailable)?;
        info!(removed, "revoked remember-me series for user");
        Ok(removed)
    }

    /// Delete grants idle longer than the token validity.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, RememberMeError> {
        let cutoff = now_unix().saturating_sub(self.config.token_validity_seconds);
        self.store
            .delete_last_used_before(cutoff)
            .await
            .map_err(RememberMeError::StoreUnavailable)
    }

    async fn revoke(&self, series: &str) -> Result<(), RememberMeError> {
        self.store
            .delete(series)
            .await
            .map_err(RememberMeError::StoreUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remember_me::store::MemoryTokenStore;
    use crate::roles::{Role, ROLE_USER};
    use crate::users::MemoryUserDirectory;
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        store: Arc<MemoryTokenStore>,
        users: Arc<MemoryUserDirectory>,
        service: RememberMeTokenService,
    }

    async fn fixture_with(config: RememberMeConfig) -> Fixture {
        let store = Arc::new(MemoryTokenStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let password = SecretString::from("password".to_string());
        for name in ["alice", "bob"] {
            users
                .add_user(name, &password, vec![Role::new(ROLE_USER)])
                .await
                .unwrap();
        }
        let service = RememberMeTokenService::new(store.clone(), users.clone(), config);
        Fixture {
            store,
            users,
            service,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RememberMeConfig::new()).await
    }

    fn raw(issued: &IssuedToken) -> String {
        issued.token().expose_secret().to_string()
    }

    #[tokio::test]
    async fn issued_pair_authenticates() {
        let fx = fixture().await;
        let issued = fx.service.issue("alice").await.unwrap();

        let authenticated = fx
            .service
            .authenticate(issued.series(), &raw(&issued))
            .await
            .unwrap();
        assert_eq!(authenticated.principal.username, "alice");
        assert_eq!(authenticated.rotated.series(), issued.series());
        assert_ne!(raw(&authenticated.rotated), raw(&issued));
    }

    #[tokio::test]
    async fn rotation_then_replay_scenario() {
        let fx = fixture().await;
        let first = fx.service.issue("alice").await.unwrap();
        let s1 = first.series().to_string();
        let t1 = raw(&first);

        let ok = fx.service.authenticate(&s1, &t1).await.unwrap();
        assert_eq!(ok.principal.username, "alice");
        let t2 = raw(&ok.rotated);
        assert_ne!(t1, t2);
        let stored = fx.store.get(&s1).await.unwrap().unwrap();
        assert_eq!(stored.token_hash, hash_token(&t2));

        let replay = fx.service.authenticate(&s1, &t1).await;
        assert!(matches!(replay, Err(RememberMeError::TokenReuseDetected)));
        assert!(fx.store.get(&s1).await.unwrap().is_none());

        let after = fx.service.authenticate(&s1, &t2).await;
        assert!(matches!(after, Err(RememberMeError::UnknownSeries)));
    }

    #[tokio::test]
    async fn invalidate_all_scenario() {
        let fx = fixture().await;
        let issued = fx.service.issue("bob").await.unwrap();
        let other = fx.service.issue("alice").await.unwrap();

        assert_eq!(fx.service.invalidate_all("bob").await.unwrap(), 1);

        let result = fx.service.authenticate(issued.series(), &raw(&issued)).await;
        assert!(matches!(result, Err(RememberMeError::UnknownSeries)));
        assert!(fx.store.get(other.series()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_then_authenticate_is_unknown() {
        let fx = fixture().await;
        let issued = fx.service.issue("alice").await.unwrap();
        fx.service.invalidate(issued.series()).await.unwrap();

        let result = fx.service.authenticate(issued.series(), &raw(&issued)).await;
        assert!(matches!(result, Err(RememberMeError::UnknownSeries)));
        let result = fx.service.authenticate(issued.series(), "anything").await;
        assert!(matches!(result, Err(RememberMeError::UnknownSeries)));
    }

    #[tokio::test]
    async fn auto_login_decodes_cookie() {
        let fx = fixture().await;
        let issued = fx.service.issue("alice").await.unwrap();

        let ok = fx.service.auto_login(&issued.cookie_value()).await.unwrap();
        assert_eq!(ok.principal.username, "alice");

        let bad = fx.service.auto_login("%%%").await;
        assert!(matches!(bad, Err(RememberMeError::MalformedCookie)));
    }

    #[tokio::test]
    async fn expired_grant_is_revoked() {
        let fx = fixture().await;
        let record = PersistentToken::new(
            "old-series".to_string(),
            "alice".to_string(),
            hash_token("old-token"),
            now_unix() - DEFAULT_TOKEN_VALIDITY_SECONDS - 10,
        );
        fx.store.insert(&record).await.unwrap();

        let result = fx.service.authenticate("old-series", "old-token").await;
        assert!(matches!(result, Err(RememberMeError::Expired)));
        assert!(fx.store.get("old-series").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_expired_removes_stale_rows() {
        let fx = fixture_with(RememberMeConfig::new().with_token_validity_seconds(60)).await;
        let fresh = fx.service.issue("alice").await.unwrap();
        let stale = PersistentToken::new(
            "stale".to_string(),
            "bob".to_string(),
            hash_token("t"),
            now_unix() - 3_600,
        );
        fx.store.insert(&stale).await.unwrap();

        assert_eq!(fx.service.purge_expired().await.unwrap(), 1);
        assert!(fx.store.get(fresh.series()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_principal_revokes_series() {
        let fx = fixture().await;
        let issued = fx.service.issue("alice").await.unwrap();
        fx.users.remove_user("alice").await;

        let result = fx.service.authenticate(issued.series(), &raw(&issued)).await;
        assert!(matches!(result, Err(RememberMeError::PrincipalNotFound)));
        assert!(fx.store.get(issued.series()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_principal_revokes_series() {
        let fx = fixture().await;
        let issued = fx.service.issue("bob").await.unwrap();
        fx.users.set_enabled("bob", false).await;

        let result = fx.service.authenticate(issued.series(), &raw(&issued)).await;
        assert!(matches!(result, Err(RememberMeError::AccountDisabled)));
        assert!(fx.store.get(issued.series()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotation_succeeds_once() {
        let fx = fixture().await;
        let service = Arc::new(fx.service);
        let issued = service.issue("alice").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let series = issued.series().to_string();
            let token = raw(&issued);
            handles.push(tokio::spawn(async move {
                service.authenticate(&series, &token).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(RememberMeError::TokenReuseDetected | RememberMeError::UnknownSeries) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
    }

    struct FailingStore;

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn get(&self, _series: &str) -> Result<Option<PersistentToken>> {
            Err(anyhow::anyhow!("database down"))
        }
        async fn insert(&self, _token: &PersistentToken) -> Result<InsertOutcome> {
            Err(anyhow::anyhow!("database down"))
        }
        async fn update_token(
            &self,
            _series: &str,
            _expected_hash: &[u8],
            _new_hash: &[u8],
            _last_used_unix: i64,
        ) -> Result<RotateOutcome> {
            Err(anyhow::anyhow!("database down"))
        }
        async fn delete(&self, _series: &str) -> Result<()> {
            Err(anyhow::anyhow!("database down"))
        }
        async fn delete_all_for_user(&self, _username: &str) -> Result<u64> {
            Err(anyhow::anyhow!("database down"))
        }
        async fn delete_last_used_before(&self, _cutoff_unix: i64) -> Result<u64> {
            Err(anyhow::anyhow!("database down"))
        }
    }

    #[tokio::test]
    async fn store_failure_never_authenticates() {
        let users = Arc::new(MemoryUserDirectory::new());
        let service =
            RememberMeTokenService::new(Arc::new(FailingStore), users, RememberMeConfig::new());

        let result = service.authenticate("series", "token").await;
        assert!(matches!(result, Err(RememberMeError::StoreUnavailable(_))));
        assert!(matches!(
            service.issue("alice").await,
            Err(RememberMeError::StoreUnavailable(_))
        ));
    }

    /// Fails the first lookup, then delegates.
    struct FlakyLoader {
        inner: Arc<MemoryUserDirectory>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl PrincipalLoader for FlakyLoader {
        async fn load_principal(&self, username: &str) -> Result<Option<Principal>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(anyhow::anyhow!("users db down"));
            }
            self.inner.load_principal(username).await
        }
    }

    #[tokio::test]
    async fn principal_outage_keeps_cookie_usable() {
        let fx = fixture().await;
        let loader = Arc::new(FlakyLoader {
            inner: fx.users.clone(),
            failed: AtomicBool::new(false),
        });
        let service =
            RememberMeTokenService::new(fx.store.clone(), loader, RememberMeConfig::new());
        let issued = service.issue("alice").await.unwrap();
        let cookie = issued.cookie_value();

        let during = service.auto_login(&cookie).await;
        let Err(err) = during else {
            panic!("login succeeded during outage");
        };
        assert!(matches!(err, RememberMeError::StoreUnavailable(_)));
        assert!(!err.clears_cookie());
        let stored = fx.store.get(issued.series()).await.unwrap().unwrap();
        assert_eq!(stored.token_hash, hash_token(&raw(&issued)));

        let after = service.auto_login(&cookie).await.unwrap();
        assert_eq!(after.principal.username, "alice");
        assert!(fx.store.get(issued.series()).await.unwrap().is_some());
    }

    struct AlwaysTakenStore;

    #[async_trait]
    impl TokenStore for AlwaysTakenStore {
        async fn get(&self, _series: &str) -> Result<Option<PersistentToken>> {
            Ok(None)
        }
        async fn insert(&self, _token: &PersistentToken) -> Result<InsertOutcome> {
            Ok(InsertOutcome::SeriesTaken)
        }
        async fn update_token(
            &self,
            _series: &str,
            _expected_hash: &[u8],
            _new_hash: &[u8],
            _last_used_unix: i64,
        ) -> Result<RotateOutcome> {
            Ok(RotateOutcome::Conflict)
        }
        async fn delete(&self, _series: &str) -> Result<()> {
            Ok(())
        }
        async fn delete_all_for_user(&self, _username: &str) -> Result<u64> {
            Ok(0)
        }
        async fn delete_last_used_before(&self, _cutoff_unix: i64) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn issue_gives_up_after_repeated_collisions() {
        let users = Arc::new(MemoryUserDirectory::new());
        let service =
            RememberMeTokenService::new(Arc::new(AlwaysTakenStore), users, RememberMeConfig::new());
        let result = service.issue("alice").await;
        assert!(matches!(result, Err(RememberMeError::StoreUnavailable(_))));
    }
}
