//! Ticket-expiry recovery.
//!
//! Handlers that talk to the CAS server on the user's behalf (proxy tickets,
//! attribute refreshes) return [`HandlerError::Ticket`] when the server
//! rejects them. The recovery layer turns that into logout + retry.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use casguard_core::CasError;

use crate::app::errors::{cas_error_to_response, html_error};
use crate::context::SessionContext;
use crate::cookie::SessionCookie;
use crate::interceptor::CasState;
use crate::redirect::found;

/// Marker left on a response rendered from a ticket failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketFailure(pub CasError);

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The CAS server rejected a ticket while the handler was running.
    #[error("ticket failure: {0}")]
    Ticket(CasError),
    #[error(transparent)]
    Other(CasError),
}

impl From<CasError> for HandlerError {
    fn from(err: CasError) -> Self {
        if err.is_ticket_failure() {
            HandlerError::Ticket(err)
        } else {
            HandlerError::Other(err)
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Ticket(err) => {
                // Rendered as-is only when no recovery layer is installed.
                let mut response = html_error(
                    StatusCode::BAD_GATEWAY,
                    "Bad Gateway",
                    "The authentication server rejected the request.",
                );
                response.extensions_mut().insert(TicketFailure(err));
                response
            }
            HandlerError::Other(err) => cas_error_to_response(err),
        }
    }
}

/// Unbinds the session and sends the browser back to the same path when the
/// handler failed with an expired or invalid ticket.
///
/// Does not retry itself: the follow-up request re-enters the whole stack,
/// so a persistent failure shows up as a redirect loop the client bounds.
pub async fn recovery_middleware(
    State(state): State<CasState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let session_id = req
        .extensions()
        .get::<SessionContext>()
        .and_then(SessionContext::session_id);

    let mut response = next.run(req).await;
    let Some(TicketFailure(err)) = response.extensions_mut().remove::<TicketFailure>() else {
        return response;
    };

    if !err.is_recoverable_in_use() {
        tracing::warn!(error = %err, path = %path, "unrecoverable ticket failure in handler");
        return response;
    }

    if let Some(id) = session_id {
        if let Err(e) = state.binder.unbind(id) {
            tracing::error!(error = %e, "failed to unbind session during ticket recovery");
            return cas_error_to_response(e);
        }
    }
    tracing::info!(
        error = %err,
        path = %path,
        "ticket expired mid-request, logging out and retrying"
    );

    let mut redirect = found(&path);
    redirect.extensions_mut().insert(SessionCookie::Clear);
    redirect
}
