//! The CAS request interceptor.
//!
//! Runs once per request, after the identity layer and before the handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use casguard_auth::logout::MAX_LOGOUT_REQUEST_LEN;
use casguard_auth::{SessionBinder, TicketValidator, TrustCheck};
use casguard_core::CasError;

use crate::app::errors::{cas_error_to_response, forbidden_not_staff};
use crate::authz::{GateDecision, staff_gate};
use crate::config::CasConfig;
use crate::context::SessionContext;
use crate::flows;
use crate::intent::{IntentClassifier, RequestIntent};
use crate::redirect::{found, login_redirect};

/// Form field carrying a CAS single-logout push.
pub const LOGOUT_REQUEST_FIELD: &str = "logoutRequest";

/// Form bodies are URL-encoded, so allow for percent-escape expansion.
const MAX_FORM_LEN: usize = 4 * MAX_LOGOUT_REQUEST_LEN;

#[derive(Clone)]
pub struct CasState {
    pub config: Arc<CasConfig>,
    pub validator: Arc<dyn TicketValidator>,
    pub binder: SessionBinder,
    pub trust: TrustCheck,
    pub classifier: Arc<IntentClassifier>,
}

impl CasState {
    pub fn new(
        config: Arc<CasConfig>,
        validator: Arc<dyn TicketValidator>,
        binder: SessionBinder,
        trust: TrustCheck,
    ) -> Self {
        let classifier = Arc::new(IntentClassifier::from_config(&config));
        Self {
            config,
            validator,
            binder,
            trust,
            classifier,
        }
    }
}

pub async fn cas_middleware(
    State(state): State<CasState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(context) = req.extensions().get::<SessionContext>().cloned() else {
        tracing::error!(
            path = %req.uri().path(),
            error = %CasError::MissingIdentityMiddleware,
            "request reached the CAS interceptor without a session context"
        );
        return cas_error_to_response(CasError::MissingIdentityMiddleware);
    };

    let intent = req
        .extensions()
        .get::<RequestIntent>()
        .copied()
        .unwrap_or_else(|| state.classifier.classify(req.uri().path()));

    match intent {
        RequestIntent::Login | RequestIntent::Logout => {
            let peer = peer_addr(&req);
            let (parts, body) = req.into_parts();
            if parts.method == Method::POST {
                let bytes = match axum::body::to_bytes(body, MAX_FORM_LEN).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable form body on a CAS entry point");
                        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
                    }
                };
                if let Some(payload) = logout_request_field(&bytes) {
                    return flows::single_logout(&state, &peer, &payload).await;
                }
            }

            if intent == RequestIntent::Login {
                flows::login(&state, &context, &parts).await
            } else {
                flows::logout(&state, &context, &parts)
            }
        }
        RequestIntent::Protected => match staff_gate(&context) {
            GateDecision::Allow => next.run(req).await,
            GateDecision::Forbidden => {
                tracing::info!(
                    username = context.username().unwrap_or_default(),
                    path = %req.uri().path(),
                    "non-staff user denied access to a protected path"
                );
                forbidden_not_staff()
            }
            GateDecision::LoginRequired => {
                let original = req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or_else(|| req.uri().path());
                found(&login_redirect(&state.config.login_path, original))
            }
        },
        RequestIntent::Other => next.run(req).await,
    }
}

/// Peer IP as a string, empty when the server was not started with connect info.
fn peer_addr(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn logout_request_field(body: &[u8]) -> Option<String> {
    form_urlencoded::parse(body)
        .find(|(key, _)| key == LOGOUT_REQUEST_FIELD)
        .map(|(_, value)| value.into_owned())
}
