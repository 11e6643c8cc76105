//! Remember-me cookie encoding and `Set-Cookie` construction.
//!
//! The cookie value is base64url(`series:token`). Both halves are themselves
//! base64url strings, so the `:` separator never appears inside them.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};

use super::error::RememberMeError;

pub const REMEMBER_ME_COOKIE_NAME: &str = "remember-me";

/// Join a series and token into a cookie value.
#[must_use]
pub fn encode_cookie_value(series: &str, token: &str) -> String {
    Base64UrlUnpadded::encode_string(format!("{series}:{token}").as_bytes())
}

/// Split a cookie value back into `(series, token)`.
///
/// # Errors
///
/// Returns `MalformedCookie` when the value is not base64url, not UTF-8, or
/// does not hold two non-empty halves.
pub fn decode_cookie_value(value: &str) -> Result<(String, String), RememberMeError> {
    let bytes = Base64UrlUnpadded::decode_vec(value.trim())
        .map_err(|_| RememberMeError::MalformedCookie)?;
    let decoded = String::from_utf8(bytes).map_err(|_| RememberMeError::MalformedCookie)?;
    let (series, token) = decoded
        .split_once(':')
        .ok_or(RememberMeError::MalformedCookie)?;
    if series.is_empty() || token.is_empty() || token.contains(':') {
        return Err(RememberMeError::MalformedCookie);
    }
    Ok((series.to_string(), token.to_string()))
}

/// Read a named cookie from the request headers.
#[must_use]
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name && !val.trim().is_empty()).then(|| val.trim().to_string())
        })
}

/// Build a `Set-Cookie` value for a cookie that must never be readable from scripts.
pub fn build_cookie(
    name: &str,
    value: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build a `Set-Cookie` value that removes the cookie from the client.
pub fn clear_cookie(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(name, "", 0, secure)
}
