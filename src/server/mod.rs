pub mod cookies;
pub mod filter;
pub mod handlers;
pub mod openapi;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::{
    remember_me::{PgTokenStore, RememberMeConfig, RememberMeTokenService},
    roles::RoleHierarchy,
    session::{SessionConfig, SessionStore, TracingSessionListener},
    users::PgUserDirectory,
};

pub use filter::{AccessRules, CurrentUser};
pub use state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or to start the server
pub async fn new(
    port: u16,
    dsn: String,
    remember_me_config: RememberMeConfig,
    session_config: SessionConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let remember_me = Arc::new(RememberMeTokenService::new(
        Arc::new(PgTokenStore::new(pool)),
        users.clone(),
        remember_me_config,
    ));
    let sessions = Arc::new(
        SessionStore::new(session_config).with_listener(Arc::new(TracingSessionListener)),
    );
    let roles = RoleHierarchy::standard().context("Invalid role hierarchy")?;

    let state = AppState::new(
        remember_me,
        users,
        sessions,
        roles,
        AccessRules::standard(),
    );

    spawn_purge_task(state.clone());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Build the router with the authentication filter and request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::me::me))
        .route(
            "/admin/users/:email/revoke",
            post(handlers::admin::revoke),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            filter::authenticate,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Periodically drop expired remember-me rows and idle sessions.
fn spawn_purge_task(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.remember_me.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "purged expired remember-me series"),
                Err(err) => error!("Failed to purge remember-me series: {err:#}"),
            }
            let removed = state.sessions.purge_expired().await;
            if removed > 0 {
                info!(removed, "purged idle sessions");
            }
        }
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
