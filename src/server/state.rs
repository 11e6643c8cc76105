use std::sync::Arc;

use super::filter::AccessRules;
use crate::{
    remember_me::RememberMeTokenService, roles::RoleHierarchy, session::SessionStore,
    users::CredentialStore,
};

/// Shared handles for handlers and the authentication middleware.
#[derive(Clone)]
pub struct AppState {
    pub remember_me: Arc<RememberMeTokenService>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<SessionStore>,
    pub roles: Arc<RoleHierarchy>,
    pub access: Arc<AccessRules>,
}

impl AppState {
    #[must_use]
    pub fn new(
        remember_me: Arc<RememberMeTokenService>,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<SessionStore>,
        roles: RoleHierarchy,
        access: AccessRules,
    ) -> Self {
        Self {
            remember_me,
            credentials,
            sessions,
            roles: Arc::new(roles),
            access: Arc::new(access),
        }
    }

    #[must_use]
    pub fn remember_me_secure(&self) -> bool {
        self.remember_me.config().cookie_secure()
    }

    #[must_use]
    pub fn session_secure(&self) -> bool {
        self.sessions.config().cookie_secure()
    }
}
