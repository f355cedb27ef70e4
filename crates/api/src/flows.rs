//! Login, logout and single-logout flows driven by the interceptor.

use axum::{
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use casguard_auth::protocol::{login_url, logout_url};
use casguard_auth::{LogoutRequest, ServiceTicket, TrustDecision};
use casguard_core::CasError;
use casguard_observability::SECURITY_TARGET;

use crate::app::errors::{cas_error_to_response, html_error, login_failed};
use crate::context::SessionContext;
use crate::cookie::SessionCookie;
use crate::interceptor::CasState;
use crate::redirect::{
    REDIRECT_FIELD_NAME, absolute, found, public_base, redirect_target, service_url,
};

/// Login entry point: bounce to the CAS server, or redeem the ticket it sent back.
pub async fn login(state: &CasState, context: &SessionContext, req: &Parts) -> Response {
    let config = &state.config;
    let query = req.uri.query().unwrap_or_default();
    let next = query_param(query, REDIRECT_FIELD_NAME);
    let ticket = query_param(query, "ticket").filter(|t| !t.is_empty());

    let Some(base) = public_base(config, &req.headers) else {
        return html_error(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "The request did not name a host.",
        );
    };
    let target = redirect_target(config, next.as_deref(), &req.headers, &base);
    let service = service_url(&base, &config.login_path, &target);
    let to_cas_login = || found(login_url(&config.server_url, &service, config.renew).as_str());

    let Some(raw_ticket) = ticket else {
        if context.is_authenticated() {
            return found(&target);
        }
        return to_cas_login();
    };

    let result = match ServiceTicket::parse(&raw_ticket) {
        Ok(ticket) => {
            let validated = tokio::time::timeout(
                config.validate_timeout,
                state.validator.validate(&ticket, &service),
            )
            .await
            .unwrap_or_else(|_| Err(CasError::network("ticket validation timed out")));
            validated.map(|identity| (identity, ticket))
        }
        Err(e) => Err(e),
    };

    match result {
        Ok((identity, ticket)) => match state.binder.bind(context.session_id(), identity, ticket) {
            Ok(session) => {
                tracing::info!(
                    username = %session.identity.username,
                    is_staff = session.is_staff,
                    session_id = %session.id,
                    "cas login"
                );
                let mut response = found(&target);
                response
                    .extensions_mut()
                    .insert(SessionCookie::Set(session.id));
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind session after cas login");
                cas_error_to_response(e)
            }
        },
        Err(e) if e.is_recoverable_in_use() => {
            tracing::info!(error = %e, "ticket rejected, requesting a fresh one");
            to_cas_login()
        }
        Err(e) => {
            tracing::warn!(error = %e, service = %service, "cas login failed");
            login_failed()
        }
    }
}

/// Logout entry point: drop the local session, then optionally the CAS one.
pub fn logout(state: &CasState, context: &SessionContext, req: &Parts) -> Response {
    let config = &state.config;

    if let Some(id) = context.session_id() {
        match state.binder.unbind(id) {
            Ok(true) => tracing::info!(
                username = context.username().unwrap_or_default(),
                session_id = %id,
                "cas logout"
            ),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to unbind session on logout");
                return cas_error_to_response(e);
            }
        }
    }

    let next = query_param(req.uri.query().unwrap_or_default(), REDIRECT_FIELD_NAME);
    let base = public_base(config, &req.headers);
    let target = match &base {
        Some(base) => redirect_target(config, next.as_deref(), &req.headers, base),
        None => config.redirect_url.clone(),
    };

    let location = if config.logout_completely {
        let back = base.map(|base| absolute(&base, &target));
        logout_url(&config.server_url, config.version, back.as_deref()).to_string()
    } else {
        target
    };

    let mut response = found(&location);
    response.extensions_mut().insert(SessionCookie::Clear);
    response
}

/// A `logoutRequest` pushed by the CAS server.
///
/// Nothing is parsed until the peer has passed the trust check.
pub async fn single_logout(state: &CasState, peer: &str, payload: &str) -> Response {
    if let TrustDecision::Denied(reason) = state.trust.check(peer).await {
        tracing::warn!(
            target: SECURITY_TARGET,
            peer = %peer,
            reason = %reason,
            "rejected single logout request from untrusted source"
        );
        return cas_error_to_response(CasError::UntrustedLogoutSource {
            peer: peer.to_string(),
        });
    }

    let request = match LogoutRequest::parse(payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "malformed single logout request");
            return cas_error_to_response(e);
        }
    };

    match state.binder.unbind_by_ticket(&request.session_index) {
        Ok(Some(id)) => tracing::info!(
            session_id = %id,
            request_id = %request.id,
            "session ended by single logout"
        ),
        Ok(None) => tracing::debug!(
            request_id = %request.id,
            "single logout for a ticket with no live session"
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to unbind session on single logout");
            return cas_error_to_response(e);
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
