use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::server::{filter::CurrentUser, state::AppState};

#[derive(ToSchema, Serialize, Debug)]
pub struct Me {
    user_id: Uuid,
    username: String,
    /// Granted roles plus everything they imply.
    roles: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current principal with effective roles", body = Me),
        (status = 401, description = "Not authenticated")
    ),
    tag = "auth"
)]
pub async fn me(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> impl IntoResponse {
    let roles = state
        .roles
        .effective_roles(&user.principal.roles)
        .into_iter()
        .map(|role| role.as_str().to_string())
        .collect();

    Json(Me {
        user_id: user.principal.user_id,
        username: user.principal.username,
        roles,
    })
}
