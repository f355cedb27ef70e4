//! Session cookie helpers.
//!
//! `SameSite=Lax` rather than `Strict`: the browser arrives back from the CAS
//! server through a cross-site redirect and must still send the cookie.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE, header::SET_COOKIE};

use casguard_core::SessionId;

use crate::config::SessionCookieConfig;

/// Change to the session cookie requested by a response.
///
/// Flows insert this into response extensions; the identity layer turns it
/// into a `Set-Cookie` header on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCookie {
    Set(SessionId),
    Clear,
}

pub fn create_session_cookie(config: &SessionCookieConfig, session_id: SessionId) -> String {
    let secure_flag = if config.secure { "; Secure" } else { "" };
    format!(
        "{}={session_id}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={}",
        config.name,
        config.max_age.as_secs()
    )
}

pub fn clear_session_cookie(config: &SessionCookieConfig) -> String {
    let secure_flag = if config.secure { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age=0",
        config.name
    )
}

/// Write the requested change as a `Set-Cookie` header.
pub fn apply(headers: &mut HeaderMap, config: &SessionCookieConfig, change: SessionCookie) {
    let value = match change {
        SessionCookie::Set(id) => create_session_cookie(config, id),
        SessionCookie::Clear => clear_session_cookie(config),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.append(SET_COOKIE, value);
    }
}

/// Extract the session id from the request's `Cookie` headers.
///
/// Unparseable values are ignored (treated as no session).
pub fn extract_session_cookie(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    let prefix = format!("{name}=");
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|part| part.trim().strip_prefix(prefix.as_str()))
        .find_map(|value| value.trim().parse().ok())
}
