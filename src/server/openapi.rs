use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use super::handlers::{admin, auth, health, me};
use crate::users::Principal;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::logout,
        me::me,
        admin::revoke,
    ),
    components(schemas(
        health::Health,
        auth::LoginRequest,
        me::Me,
        admin::Revoked,
        Principal,
    )),
    tags(
        (name = "health", description = "Liveness and build information"),
        (name = "auth", description = "Interactive and remember-me authentication"),
        (name = "admin", description = "Grant revocation")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

// axum handler for /openapi.json
pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}
