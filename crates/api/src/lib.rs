//! CAS single sign-on for axum: identity attachment, request interception,
//! login/logout flows and ticket-expiry recovery.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod cookie;
pub mod flows;
pub mod intent;
pub mod interceptor;
pub mod middleware;
pub mod recovery;
pub mod redirect;

pub use app::{AppDeps, CasGuard, IdentityAttachment, build_app, build_app_with};
pub use config::CasConfig;
pub use context::SessionContext;
pub use intent::{IntentClassifier, ProtectedRule, RequestIntent};
pub use interceptor::CasState;
pub use recovery::HandlerError;
