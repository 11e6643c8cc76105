use thiserror::Error;

/// Reasons a remember-me operation did not authenticate the caller.
///
/// Every variant ends the same way for the user (log in interactively); they
/// differ in log severity and in whether the series was revoked.
#[derive(Debug, Error)]
pub enum RememberMeError {
    #[error("malformed remember-me cookie")]
    MalformedCookie,
    #[error("unknown remember-me series")]
    UnknownSeries,
    #[error("remember-me token reuse detected")]
    TokenReuseDetected,
    #[error("remember-me grant expired")]
    Expired,
    #[error("principal not found")]
    PrincipalNotFound,
    #[error("account disabled")]
    AccountDisabled,
    #[error("token store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("failed to generate random token: {0}")]
    TokenGeneration(#[source] rand::Error),
}

impl RememberMeError {
    /// Whether the series was deleted as part of this failure.
    #[must_use]
    pub const fn revoked_series(&self) -> bool {
        matches!(
            self,
            Self::TokenReuseDetected
                | Self::Expired
                | Self::PrincipalNotFound
                | Self::AccountDisabled
        )
    }

    /// Whether the client should drop its cookie.
    ///
    /// Storage failures keep the cookie: the grant may still be valid.
    #[must_use]
    pub const fn clears_cookie(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_) | Self::TokenGeneration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_revokes_and_clears() {
        let err = RememberMeError::TokenReuseDetected;
        assert!(err.revoked_series());
        assert!(err.clears_cookie());
    }

    #[test]
    fn unknown_series_clears_without_revocation() {
        let err = RememberMeError::UnknownSeries;
        assert!(!err.revoked_series());
        assert!(err.clears_cookie());
        assert!(!RememberMeError::MalformedCookie.revoked_series());
    }

    #[test]
    fn store_unavailable_keeps_cookie() {
        let err = RememberMeError::StoreUnavailable(anyhow::anyhow!("connection refused"));
        assert!(!err.revoked_series());
        assert!(!err.clears_cookie());
        assert!(err.to_string().contains("connection refused"));
    }
}
