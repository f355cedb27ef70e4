//! Identity attachment: turns the session cookie into a [`SessionContext`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use casguard_auth::SessionBinder;

use crate::config::SessionCookieConfig;
use crate::context::SessionContext;
use crate::cookie::{self, SessionCookie};

#[derive(Clone)]
pub struct SessionLayerState {
    pub binder: SessionBinder,
    pub cookie: Arc<SessionCookieConfig>,
}

pub async fn session_middleware(
    State(state): State<SessionLayerState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let presented = cookie::extract_session_cookie(req.headers(), &state.cookie.name);

    let context = match presented {
        Some(id) => match state.binder.current(id) {
            Ok(Some(session)) => SessionContext::authenticated(session),
            Ok(None) => SessionContext::anonymous(Some(id)),
            Err(e) => {
                tracing::error!(error = %e, "session store unavailable");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => SessionContext::anonymous(None),
    };

    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;
    if let Some(change) = response.extensions_mut().remove::<SessionCookie>() {
        cookie::apply(response.headers_mut(), &state.cookie, change);
    }
    response
}
