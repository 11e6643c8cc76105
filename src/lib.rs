//! # Rememberme (session & persistent login authority)
//!
//! `rememberme` is the authentication layer of a web application: interactive
//! login backed by Argon2 password hashes, server-side HTTP sessions, and a
//! persistent "remember-me" grant that survives browser restarts.
//!
//! ## Remember-me grants
//!
//! A grant is a `series:token` pair carried in a single `HttpOnly` cookie.
//! The series is stable for the life of the grant, the token rotates on every
//! silent re-authentication, and only a SHA-256 digest of the token is stored.
//! Presenting a stale token is treated as theft: the whole series is deleted
//! and the user must log in again.
//!
//! ## Authorization
//!
//! Roles form an explicit DAG (`ROLE_ADMIN > ROLE_USER` by default) resolved
//! once at startup into per-role reachability sets, so access checks never
//! walk the hierarchy per request.

pub mod cli;
pub mod remember_me;
pub mod roles;
pub mod server;
pub mod session;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
