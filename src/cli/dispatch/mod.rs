use crate::{cli::actions::Action, remember_me::RememberMeConfig, session::SessionConfig};
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let secure = !matches.get_flag("cookie-insecure");

    let remember_me = RememberMeConfig::new()
        .with_token_validity_seconds(
            matches
                .get_one::<i64>("remember-me-ttl")
                .copied()
                .unwrap_or(1_209_600),
        )
        .with_cookie_secure(secure);

    let session = SessionConfig::new()
        .with_idle_timeout_seconds(
            matches
                .get_one::<i64>("session-ttl")
                .copied()
                .unwrap_or(1_800),
        )
        .with_cookie_secure(secure);

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        remember_me,
        session,
    })
}
