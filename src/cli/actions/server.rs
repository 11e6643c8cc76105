use crate::cli::actions::Action;
use crate::server::new;
use anyhow::{anyhow, Context, Result};
use tracing::info;
use url::Url;

/// Handle the server action
///
/// # Errors
///
/// Returns an error if the DSN is invalid or the server fails
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            remember_me,
            session,
        } => {
            let url = Url::parse(&dsn).context("Invalid database connection string")?;
            if !matches!(url.scheme(), "postgres" | "postgresql") {
                return Err(anyhow!("Unsupported database scheme: {}", url.scheme()));
            }

            info!(
                db.host = url.host_str().unwrap_or("localhost"),
                remember_me_ttl = remember_me.token_validity_seconds(),
                session_ttl = session.idle_timeout_seconds(),
                "starting server"
            );

            new(port, dsn, remember_me, session).await?;
        }
    }

    Ok(())
}
