use axum::{
    routing::{any, get},
    Router,
};

use crate::config::CasConfig;

pub mod admin;
pub mod system;

/// Demo host router. The CAS layers are applied on top by [`crate::app::CasGuard`].
pub fn router(config: &CasConfig) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/whoami", get(system::whoami))
        .route(&config.login_path, any(system::entry_point_not_intercepted))
        .route(&config.logout_path, any(system::entry_point_not_intercepted))
        .merge(admin::router())
        .fallback(system::not_found)
}
