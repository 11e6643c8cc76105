//! Per-request authentication and access control.
//!
//! Flow Overview:
//! 1) Classify the path against [`AccessRules`]; ignored paths skip everything.
//! 2) Resolve the caller from the session cookie, or failing that from the
//!    remember-me cookie (which opens a new session and rotates the token).
//! 3) Enforce the rule: 401 without a caller, 403 without the required role.
//! 4) Attach any cookies the handler did not set itself.

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info};

use super::{
    cookies::{
        append_cookie, clear_remember_me_cookie, remember_me_cookie, session_cookie, sets_cookie,
    },
    state::AppState,
};
use crate::{
    remember_me::{cookie::extract_cookie, RememberMeError, REMEMBER_ME_COOKIE_NAME},
    roles::{Role, ROLE_ADMIN},
    session::SESSION_COOKIE_NAME,
    users::Principal,
};

/// Caller resolved for this request, available to handlers as an extension.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub principal: Principal,
    /// `None` only when a remember-me login could not open a session.
    pub session_id: Option<String>,
}

/// What a path requires of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Not authenticated at all (static assets, health checks).
    Ignored,
    /// Caller resolved when possible, never required.
    Public,
    Authenticated,
    Role(Role),
}

#[derive(Clone, Debug, Default)]
pub struct AccessRules {
    ignored: Vec<String>,
    public: Vec<String>,
    guarded: Vec<(String, Role)>,
}

impl AccessRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the bundled routes.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .ignore("/health")
            .ignore("/openapi.json")
            .ignore("/static/")
            .ignore("/favicon.ico")
            .permit("/")
            .permit("/login")
            .permit("/logout")
            .require_role("/admin", ROLE_ADMIN)
    }

    /// Skip authentication for `prefix` and everything below it.
    #[must_use]
    pub fn ignore(mut self, prefix: &str) -> Self {
        self.ignored.push(prefix.to_string());
        self
    }

    /// Allow anonymous access to exactly `path`.
    #[must_use]
    pub fn permit(mut self, path: &str) -> Self {
        self.public.push(path.to_string());
        self
    }

    /// Require `role` (directly or through the hierarchy) under `prefix`.
    #[must_use]
    pub fn require_role(mut self, prefix: &str, role: &str) -> Self {
        self.guarded.push((prefix.to_string(), Role::new(role)));
        self
    }

    /// Anything not listed requires an authenticated caller.
    #[must_use]
    pub fn classify(&self, path: &str) -> Access {
        if self.ignored.iter().any(|prefix| under_prefix(path, prefix)) {
            return Access::Ignored;
        }
        if self.public.iter().any(|public| public == path) {
            return Access::Public;
        }
        self.guarded
            .iter()
            .find(|(prefix, _)| under_prefix(path, prefix))
            .map_or(Access::Authenticated, |(_, role)| Access::Role(role.clone()))
    }
}

/// `/admin` covers `/admin` and `/admin/...` but not `/administrator`.
fn under_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// axum middleware; install with `middleware::from_fn_with_state`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let access = state.access.classify(request.uri().path());
    if access == Access::Ignored {
        return next.run(request).await;
    }

    let mut cookies = HeaderMap::new();
    let caller = resolve_caller(&state, request.headers(), &mut cookies).await;

    match (&access, &caller) {
        (Access::Authenticated | Access::Role(_), None) => {
            debug!("unauthenticated request to protected path");
            return (StatusCode::UNAUTHORIZED, cookies).into_response();
        }
        (Access::Role(required), Some(user))
            if !state.roles.grants(&user.principal.roles, required) =>
        {
            info!(username = %user.principal.username, role = %required, "access denied");
            return (StatusCode::FORBIDDEN, cookies).into_response();
        }
        _ => {}
    }

    if let Some(user) = caller {
        request.extensions_mut().insert(user);
    }

    let mut response = next.run(request).await;
    for name in [SESSION_COOKIE_NAME, REMEMBER_ME_COOKIE_NAME] {
        if sets_cookie(response.headers(), name) {
            continue;
        }
        let prefix = format!("{name}=");
        for value in cookies.get_all(SET_COOKIE) {
            if value.to_str().is_ok_and(|cookie| cookie.starts_with(&prefix)) {
                response.headers_mut().append(SET_COOKIE, value.clone());
            }
        }
    }
    response
}

async fn resolve_caller(
    state: &AppState,
    headers: &HeaderMap,
    cookies: &mut HeaderMap,
) -> Option<CurrentUser> {
    if let Some(session_id) = extract_cookie(headers, SESSION_COOKIE_NAME) {
        if let Some(session) = state.sessions.get(&session_id).await {
            return Some(CurrentUser {
                principal: session.principal,
                session_id: Some(session.id),
            });
        }
    }

    let cookie_value = extract_cookie(headers, REMEMBER_ME_COOKIE_NAME)?;
    match state.remember_me.auto_login(&cookie_value).await {
        Ok(authenticated) => {
            append_cookie(cookies, remember_me_cookie(state, &authenticated.rotated));
            let session_id = match state.sessions.create(authenticated.principal.clone()).await {
                Ok(session) => {
                    append_cookie(cookies, session_cookie(state, &session.id));
                    Some(session.id)
                }
                Err(err) => {
                    error!("Failed to open session after remember-me login: {err}");
                    None
                }
            };
            Some(CurrentUser {
                principal: authenticated.principal,
                session_id,
            })
        }
        Err(err) => {
            log_rejection(&err);
            if err.clears_cookie() {
                append_cookie(cookies, clear_remember_me_cookie(state));
            }
            None
        }
    }
}

fn log_rejection(err: &RememberMeError) {
    match err {
        RememberMeError::StoreUnavailable(_) | RememberMeError::TokenGeneration(_) => {
            error!("Remember-me login failed: {err:#}");
        }
        // Logged as a security event where it was detected.
        RememberMeError::TokenReuseDetected => {}
        _ => debug!("remember-me cookie rejected: {err}"),
    }
}
