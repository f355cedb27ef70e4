use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use casguard_core::CasError;

/// Plain HTML error page. `title` and `message` must be static text, never request data.
pub fn html_error(status: StatusCode, title: &'static str, message: &'static str) -> Response {
    (
        status,
        Html(format!("<h1>{title}</h1><p>{message}</p>")),
    )
        .into_response()
}

pub fn forbidden_not_staff() -> Response {
    html_error(
        StatusCode::FORBIDDEN,
        "Forbidden",
        "You do not have staff privileges.",
    )
}

pub fn login_failed() -> Response {
    html_error(
        StatusCode::FORBIDDEN,
        "Login failed",
        "The CAS server could not confirm your login. Please try again.",
    )
}

pub fn cas_error_to_response(err: CasError) -> Response {
    match err {
        CasError::TicketInvalid(_) | CasError::TicketExpired(_) | CasError::ServiceMismatch(_) => {
            login_failed()
        }
        CasError::NetworkFailure(_) | CasError::MalformedResponse(_) => html_error(
            StatusCode::BAD_GATEWAY,
            "Bad Gateway",
            "The authentication server is unavailable.",
        ),
        CasError::UntrustedLogoutSource { .. } => {
            html_error(StatusCode::FORBIDDEN, "Forbidden", "Untrusted logout request.")
        }
        CasError::InvalidLogoutRequest(_) => html_error(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "Malformed logout request.",
        ),
        CasError::InvalidId(_) => {
            html_error(StatusCode::BAD_REQUEST, "Bad Request", "Invalid identifier.")
        }
        CasError::SessionStore(_) => html_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            "Sessions are temporarily unavailable.",
        ),
        CasError::MissingIdentityMiddleware | CasError::Config(_) => html_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server Error",
            "Authentication is misconfigured.",
        ),
    }
}
