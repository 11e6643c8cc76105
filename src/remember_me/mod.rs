//! Persistent "remember me" logins.
//!
//! A grant is a `series` (stable for the life of the grant) plus a `token`
//! (rotated on every use). Only a SHA-256 digest of the token is stored. A
//! presented token that does not match the stored digest for a known series
//! means the cookie was copied and replayed, so the whole series is revoked.

pub mod cookie;
pub mod error;
pub mod postgres;
pub mod service;
pub mod store;
pub mod token;

pub use cookie::REMEMBER_ME_COOKIE_NAME;
pub use error::RememberMeError;
pub use postgres::PgTokenStore;
pub use service::{Authenticated, RememberMeConfig, RememberMeTokenService};
pub use store::{InsertOutcome, MemoryTokenStore, RotateOutcome, TokenStore};
pub use token::{IssuedToken, PersistentToken};
