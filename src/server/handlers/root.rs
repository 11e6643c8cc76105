use axum::{extract::Extension, response::IntoResponse};

use crate::server::filter::CurrentUser;

// axum handler for /
pub async fn root(user: Option<Extension<CurrentUser>>) -> impl IntoResponse {
    match user {
        Some(Extension(user)) => format!("Hello, {}!", user.principal.username),
        None => "Hello, World!".to_string(),
    }
}
