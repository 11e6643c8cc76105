use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    server::{filter::CurrentUser, state::AppState},
    users::normalize_username,
};

#[derive(ToSchema, Serialize, Debug)]
pub struct Revoked {
    username: String,
    revoked: u64,
}

#[utoipa::path(
    post,
    path = "/admin/users/{email}/revoke",
    params(
        ("email" = String, Path, description = "User whose remember-me grants are revoked")
    ),
    responses(
        (status = 200, description = "All remember-me grants of the user deleted", body = Revoked),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller lacks ROLE_ADMIN"),
        (status = 503, description = "Token store unavailable")
    ),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn revoke(
    Extension(state): Extension<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(email): Path<String>,
) -> Response {
    let username = normalize_username(&email);
    match state.remember_me.invalidate_all(&username).await {
        Ok(revoked) => {
            info!(admin = %admin.principal.username, %username, revoked, "revoked remember-me grants");
            Json(Revoked { username, revoked }).into_response()
        }
        Err(err) => {
            error!("Failed to revoke remember-me grants: {err:#}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
