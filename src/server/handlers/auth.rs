//! Interactive login and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::{
    remember_me::{
        cookie::{decode_cookie_value, extract_cookie},
        REMEMBER_ME_COOKIE_NAME,
    },
    server::{
        cookies::{
            append_cookie, clear_remember_me_cookie, clear_session_cookie, remember_me_cookie,
            session_cookie,
        },
        filter::CurrentUser,
        state::AppState,
    },
    session::{Session, SESSION_COOKIE_NAME},
    users::{normalize_username, password::verify_password, valid_username, Principal},
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    remember_me: bool,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set, remember-me cookie when requested", body = Principal),
        (status = 400, description = "Missing payload or invalid email"),
        (status = 401, description = "Bad credentials or disabled account"),
        (status = 503, description = "User directory unavailable")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let username = normalize_username(&request.email);
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid email").into_response();
    }
    let password = SecretString::from(request.password);

    let credentials = match state.credentials.find_credentials(&username).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            debug!("login for unknown user");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            error!("Failed to lookup credentials: {err:#}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    // Argon2 is CPU bound; keep it off the async workers.
    let password_hash = credentials.password_hash.clone();
    let verified =
        tokio::task::spawn_blocking(move || verify_password(&password_hash, password.expose_secret()))
            .await;
    match verified {
        Ok(true) => {}
        Ok(false) => {
            debug!("login with wrong password");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            error!("Password verification task failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let principal = credentials.principal;
    if !principal.enabled {
        info!(username = %principal.username, "login for disabled account");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // A login never keeps a session id the client held before it. A live
    // session moves to a new id; otherwise a new one is opened.
    let known_ids = user
        .and_then(|Extension(user)| user.session_id)
        .into_iter()
        .chain(extract_cookie(&headers, SESSION_COOKIE_NAME));
    let session = match start_session(&state, known_ids, &principal).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    append_cookie(&mut response_headers, session_cookie(&state, &session.id));

    if request.remember_me {
        match state.remember_me.issue(&principal.username).await {
            Ok(issued) => append_cookie(&mut response_headers, remember_me_cookie(&state, &issued)),
            // The interactive login still stands without the persistent grant.
            Err(err) => error!("Failed to issue remember-me token: {err:#}"),
        }
    }

    info!(username = %principal.username, remember_me = request.remember_me, "login succeeded");
    (StatusCode::OK, response_headers, Json(principal)).into_response()
}

/// Renew the first live session among `known_ids` for `principal`, destroy the
/// rest, and fall back to a new session.
async fn start_session(
    state: &AppState,
    known_ids: impl Iterator<Item = String>,
    principal: &Principal,
) -> Result<Session, rand::Error> {
    let mut renewed: Option<Session> = None;
    for id in known_ids {
        if renewed.is_some() {
            state.sessions.destroy(&id).await;
        } else {
            renewed = state.sessions.renew(&id, principal.clone()).await?;
        }
    }
    match renewed {
        Some(session) => Ok(session),
        None => state.sessions.create(principal.clone()).await,
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session destroyed, remember-me grant revoked, cookies cleared")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    if let Some(session_id) = extract_cookie(&headers, SESSION_COOKIE_NAME) {
        state.sessions.destroy(&session_id).await;
    }
    if let Some(session_id) = user.and_then(|Extension(user)| user.session_id) {
        state.sessions.destroy(&session_id).await;
    }

    if let Some(value) = extract_cookie(&headers, REMEMBER_ME_COOKIE_NAME) {
        match decode_cookie_value(&value) {
            Ok((series, _)) => {
                if let Err(err) = state.remember_me.invalidate(&series).await {
                    error!("Failed to invalidate remember-me series: {err:#}");
                }
            }
            Err(_) => debug!("ignoring malformed remember-me cookie on logout"),
        }
    }

    // Always clear both cookies, even if nothing was found server-side.
    let mut response_headers = HeaderMap::new();
    append_cookie(&mut response_headers, clear_session_cookie(&state));
    append_cookie(&mut response_headers, clear_remember_me_cookie(&state));
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
