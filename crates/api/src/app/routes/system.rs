use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::app::errors::html_error;
use crate::context::SessionContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(context): Extension<SessionContext>) -> impl IntoResponse {
    let session = context.session();
    Json(serde_json::json!({
        "authenticated": context.is_authenticated(),
        "username": context.username(),
        "is_staff": context.is_staff(),
        "attributes": session.map(|s| &s.identity.attributes),
        "logged_in_at": session.map(|s| s.created_at.to_rfc3339()),
    }))
}

/// Bound to the login and logout paths so they exist in the router; the
/// interceptor answers these requests before they get here.
pub async fn entry_point_not_intercepted() -> Response {
    tracing::error!("cas entry point reached its handler: interceptor is not installed");
    html_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Server Error",
        "Authentication is misconfigured.",
    )
}

pub async fn not_found() -> Response {
    html_error(StatusCode::NOT_FOUND, "Not Found", "No such page.")
}
