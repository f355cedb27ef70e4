//! Redirect targets, service URLs and `302 Found` responses.

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use crate::config::CasConfig;

/// Query parameter carrying the post-login destination.
pub const REDIRECT_FIELD_NAME: &str = "next";

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!(location = %location, "refusing to emit an invalid Location header");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Public `scheme://host[:port]` of this service, without a trailing slash.
///
/// Configured base URL wins; otherwise derived from `Host` and
/// `X-Forwarded-Proto`. `None` when the request carries no usable host.
pub fn public_base(config: &CasConfig, headers: &HeaderMap) -> Option<String> {
    if let Some(base) = &config.service_base_url {
        return Some(base.as_str().trim_end_matches('/').to_string());
    }

    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    if host.is_empty() || host.contains(['/', '\\', '@', ' ']) {
        return None;
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| *s == "https" || *s == "http")
        .unwrap_or("http");

    Some(format!("{scheme}://{host}"))
}

/// Where to send the browser after login or logout.
///
/// `next` parameter first, then the `Referer` (unless ignored), then the
/// configured default.
pub fn redirect_target(
    config: &CasConfig,
    next: Option<&str>,
    headers: &HeaderMap,
    base: &str,
) -> String {
    let candidate = match next.map(str::trim).filter(|n| !n.is_empty()) {
        Some(next) => next.to_string(),
        None if config.ignore_referer => config.redirect_url.clone(),
        None => headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| config.redirect_url.clone()),
    };

    sanitize_target(&candidate, base, &config.redirect_url)
}

/// Reduce same-host absolute URLs to their path; anything pointing elsewhere
/// falls back to `default`.
pub fn sanitize_target(candidate: &str, base: &str, default: &str) -> String {
    let local = match candidate.strip_prefix(base) {
        Some("") => "/",
        Some(rest) => rest,
        None => candidate,
    };

    let is_local_path = local.starts_with('/')
        && !local.starts_with("//")
        && !local.starts_with("/\\")
        && local.bytes().all(|b| b.is_ascii_graphic());

    if is_local_path {
        local.to_string()
    } else {
        default.to_string()
    }
}

/// The service URL registered with the CAS server for this login attempt.
///
/// It has to be reproduced byte for byte when the ticket comes back, so it
/// only depends on the base, the login path and the redirect target.
pub fn service_url(base: &str, login_path: &str, target: &str) -> String {
    format!("{base}{login_path}?{}", next_query(target))
}

/// Login entry point carrying `next=<original>`.
pub fn login_redirect(login_path: &str, original: &str) -> String {
    format!("{login_path}?{}", next_query(original))
}

/// Make a local target absolute against `base`.
pub fn absolute(base: &str, target: &str) -> String {
    if target.starts_with('/') {
        format!("{base}{target}")
    } else {
        target.to_string()
    }
}

fn next_query(target: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair(REDIRECT_FIELD_NAME, target)
        .finish()
}
