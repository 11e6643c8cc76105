//! `Set-Cookie` plumbing shared by the filter and the handlers.

use axum::http::{
    header::{InvalidHeaderValue, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use tracing::error;

use super::state::AppState;
use crate::remember_me::{
    cookie::{build_cookie, clear_cookie},
    IssuedToken, REMEMBER_ME_COOKIE_NAME,
};
use crate::session::SESSION_COOKIE_NAME;

pub(crate) fn session_cookie(
    state: &AppState,
    session_id: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        SESSION_COOKIE_NAME,
        session_id,
        state.sessions.config().idle_timeout_seconds(),
        state.session_secure(),
    )
}

pub(crate) fn remember_me_cookie(
    state: &AppState,
    issued: &IssuedToken,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        REMEMBER_ME_COOKIE_NAME,
        &issued.cookie_value(),
        state.remember_me.config().token_validity_seconds(),
        state.remember_me_secure(),
    )
}

pub(crate) fn clear_session_cookie(state: &AppState) -> Result<HeaderValue, InvalidHeaderValue> {
    clear_cookie(SESSION_COOKIE_NAME, state.session_secure())
}

pub(crate) fn clear_remember_me_cookie(
    state: &AppState,
) -> Result<HeaderValue, InvalidHeaderValue> {
    clear_cookie(REMEMBER_ME_COOKIE_NAME, state.remember_me_secure())
}

/// Append a `Set-Cookie` header, logging instead of failing on a bad value.
pub(crate) fn append_cookie(
    headers: &mut HeaderMap,
    cookie: Result<HeaderValue, InvalidHeaderValue>,
) {
    match cookie {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build Set-Cookie header: {err}"),
    }
}

/// Whether `headers` already set (or cleared) the named cookie.
pub(crate) fn sets_cookie(headers: &HeaderMap, name: &str) -> bool {
    let prefix = format!("{name}=");
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}
