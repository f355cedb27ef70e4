//! Application wiring: the [`CasGuard`] layer stack and the demo host router.
//!
//! - `routes/`: demo host handlers (health, whoami, the admin area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state};
use tower::ServiceBuilder;

use casguard_auth::{
    CachingResolver, HostResolver, HttpTicketValidator, InMemorySessionStore, SessionBinder,
    SessionStore, SystemResolver, TicketValidator, TrustCheck,
};
use casguard_core::{CasError, CasResult};

use crate::config::CasConfig;
use crate::interceptor::{CasState, cas_middleware};
use crate::middleware::{SessionLayerState, session_middleware};
use crate::recovery::recovery_middleware;

pub mod errors;
pub mod routes;

/// How a [`crate::context::SessionContext`] reaches the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityAttachment {
    /// The built-in session cookie layer.
    SessionCookie,
    /// The host installs its own layer (outside this one) that inserts the
    /// context and applies [`crate::cookie::SessionCookie`] changes.
    Upstream,
}

/// Installs CAS interception over a host router.
///
/// Routes and the fallback must be added to the router before [`CasGuard::apply`],
/// since axum layers only wrap what is already there.
pub struct CasGuard {
    state: CasState,
    identity: Option<IdentityAttachment>,
}

impl CasGuard {
    pub fn new(state: CasState) -> Self {
        Self {
            state,
            identity: None,
        }
    }

    pub fn with_session_cookie_identity(mut self) -> Self {
        self.identity = Some(IdentityAttachment::SessionCookie);
        self
    }

    pub fn with_upstream_identity(mut self) -> Self {
        self.identity = Some(IdentityAttachment::Upstream);
        self
    }

    /// Layer order, outermost first: identity, interceptor, recovery.
    pub fn apply(self, router: Router) -> CasResult<Router> {
        let Some(identity) = self.identity else {
            tracing::error!("CAS interception requires an identity attachment layer");
            return Err(CasError::MissingIdentityMiddleware);
        };

        let router = router.layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(self.state.clone(), cas_middleware))
                .layer(from_fn_with_state(self.state.clone(), recovery_middleware)),
        );

        Ok(match identity {
            IdentityAttachment::SessionCookie => {
                let session_state = SessionLayerState {
                    binder: self.state.binder.clone(),
                    cookie: Arc::new(self.state.config.cookie.clone()),
                };
                router.layer(from_fn_with_state(session_state, session_middleware))
            }
            IdentityAttachment::Upstream => router,
        })
    }
}

/// External collaborators of the layer, swappable for tests.
pub struct AppDeps {
    pub validator: Arc<dyn TicketValidator>,
    pub store: Arc<dyn SessionStore>,
    pub resolver: Arc<dyn HostResolver>,
}

impl AppDeps {
    pub fn from_config(config: &CasConfig) -> CasResult<Self> {
        let validator = HttpTicketValidator::new(
            config.server_url.clone(),
            config.version,
            config.validate_timeout,
        )?
        .with_renew(config.renew);

        let resolver: Arc<dyn HostResolver> = match config.dns_cache_ttl {
            Some(ttl) => Arc::new(CachingResolver::new(SystemResolver, ttl)),
            None => Arc::new(SystemResolver),
        };

        Ok(Self {
            validator: Arc::new(validator),
            store: Arc::new(InMemorySessionStore::new()),
            resolver,
        })
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: CasConfig) -> CasResult<Router> {
    let deps = AppDeps::from_config(&config)?;
    build_app_with(config, deps)
}

pub fn build_app_with(config: CasConfig, deps: AppDeps) -> CasResult<Router> {
    let config = Arc::new(config);
    let binder = SessionBinder::new(deps.store, config.staff_policy())
        .with_max_age(config.cookie.max_age);
    let trust = TrustCheck::new(config.trust_config(), deps.resolver);
    let state = CasState::new(config.clone(), deps.validator, binder, trust);

    tracing::info!(
        cas_server = %config.server_url,
        version = ?config.version,
        login_path = %config.login_path,
        logout_path = %config.logout_path,
        "cas interception enabled"
    );

    CasGuard::new(state)
        .with_session_cookie_identity()
        .apply(routes::router(&config))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode, header},
        response::Response,
        routing::get,
    };
    use tower::ServiceExt;
    use url::Url;

    use casguard_auth::{AuthenticatedIdentity, ServiceTicket, StaticResolver};
    use casguard_core::SessionId;

    use super::*;
    use crate::recovery::HandlerError;

    struct StubValidator(CasResult<AuthenticatedIdentity>);

    #[async_trait]
    impl TicketValidator for StubValidator {
        async fn validate(
            &self,
            _ticket: &ServiceTicket,
            _service: &str,
        ) -> CasResult<AuthenticatedIdentity> {
            self.0.clone()
        }
    }

    const CAS_HOST_IP: [u8; 4] = [10, 0, 0, 1];

    fn config() -> CasConfig {
        let mut config = CasConfig::new(Url::parse("https://cas.example.edu/cas/").unwrap());
        config.staff_users = vec!["alice".to_string()];
        config.logout_allowed_hosts = vec!["cas.example.edu".to_string()];
        config.cookie.secure = false;
        config
    }

    async fn report() -> Result<&'static str, HandlerError> {
        Err(CasError::ticket_expired("proxy ticket expired").into())
    }

    async fn upstream_failure() -> Result<&'static str, HandlerError> {
        Err(CasError::service_mismatch("wrong service").into())
    }

    fn state(
        outcome: CasResult<AuthenticatedIdentity>,
        store: Arc<InMemorySessionStore>,
    ) -> CasState {
        let config = Arc::new(config());
        let binder = SessionBinder::new(store, config.staff_policy())
            .with_max_age(config.cookie.max_age);
        let resolver = StaticResolver::new().with_entry(CAS_HOST_IP.into(), "CAS.example.edu.");
        let trust = TrustCheck::new(config.trust_config(), Arc::new(resolver));
        CasState::new(config, Arc::new(StubValidator(outcome)), binder, trust)
    }

    fn host_router() -> Router {
        routes::router(&config())
            .route("/admin/report", get(report))
            .route("/admin/upstream", get(upstream_failure))
    }

    fn app_for(outcome: CasResult<AuthenticatedIdentity>) -> (Router, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let router = CasGuard::new(state(outcome, store.clone()))
            .with_session_cookie_identity()
            .apply(host_router())
            .unwrap();
        (router, store)
    }

    fn get_req(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).header(header::HOST, "app.example.edu");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn slo_req(peer: Option<[u8; 4]>, ticket: &str) -> Request<Body> {
        let xml = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="LR-1" Version="2.0"><saml:NameID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">@NOT_USED@</saml:NameID><samlp:SessionIndex>{ticket}</samlp:SessionIndex></samlp:LogoutRequest>"#
        );
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("logoutRequest", &xml)
            .finish();
        let mut req = Request::builder()
            .method("POST")
            .uri("/accounts/login/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        if let Some(ip) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
        }
        req
    }

    fn location(res: &Response) -> &str {
        res.headers()
            .get(header::LOCATION)
            .expect("location header")
            .to_str()
            .unwrap()
    }

    fn session_cookie(res: &Response) -> String {
        let set = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap();
        set.split(';').next().unwrap().to_string()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Logs in through the ticket flow and returns the session cookie pair.
    async fn login(app: &Router) -> String {
        let res = app
            .clone()
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc&next=%2Fadmin%2F", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        session_cookie(&res)
    }

    #[test]
    fn apply_requires_an_identity_layer() {
        let store = Arc::new(InMemorySessionStore::new());
        let err = CasGuard::new(state(Ok(AuthenticatedIdentity::new("alice")), store))
            .apply(host_router())
            .unwrap_err();
        assert_eq!(err, CasError::MissingIdentityMiddleware);
    }

    #[tokio::test]
    async fn missing_session_context_is_a_server_error() {
        let store = Arc::new(InMemorySessionStore::new());
        let app = CasGuard::new(state(Ok(AuthenticatedIdentity::new("alice")), store))
            .with_upstream_identity()
            .apply(host_router())
            .unwrap();

        let res = app.oneshot(get_req("/admin/", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn anonymous_protected_request_redirects_to_login_with_next() {
        let (app, _) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app.oneshot(get_req("/admin/users?page=2", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            location(&res),
            "/accounts/login/?next=%2Fadmin%2Fusers%3Fpage%3D2"
        );
    }

    #[tokio::test]
    async fn unprotected_paths_pass_through() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app.oneshot(get_req("/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn login_without_ticket_goes_to_the_cas_server() {
        let (app, _) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app
            .oneshot(get_req("/accounts/login/?next=%2Fadmin%2F", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);

        let url = Url::parse(location(&res)).unwrap();
        assert_eq!(url.host_str(), Some("cas.example.edu"));
        assert_eq!(url.path(), "/cas/login");
        let service = url
            .query_pairs()
            .find(|(k, _)| k == "service")
            .map(|(_, v)| v.into_owned());
        assert_eq!(
            service.as_deref(),
            Some("http://app.example.edu/accounts/login/?next=%2Fadmin%2F")
        );
    }

    #[tokio::test]
    async fn successful_login_binds_one_session_and_redirects_to_next() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app
            .clone()
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc&next=%2Fadmin%2F", None))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/admin/");
        assert_eq!(store.len(), 1);

        let cookie = session_cookie(&res);
        let res = app.oneshot(get_req("/admin/", Some(cookie.as_str()))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("Welcome, alice."));
    }

    #[tokio::test]
    async fn login_without_next_uses_the_default_target() {
        let (app, _) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc", None))
            .await
            .unwrap();
        assert_eq!(location(&res), "/");
    }

    #[tokio::test]
    async fn authenticated_non_staff_gets_403_not_a_redirect() {
        let (app, _) = app_for(Ok(AuthenticatedIdentity::new("bob")));
        let cookie = login(&app).await;

        let res = app.oneshot(get_req("/admin/", Some(cookie.as_str()))).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(res.headers().get(header::LOCATION).is_none());
        assert!(body_text(res).await.contains("You do not have staff privileges."));
    }

    #[tokio::test]
    async fn expired_ticket_at_login_asks_the_cas_server_again() {
        let (app, store) = app_for(Err(CasError::ticket_expired("expired")));
        let res = app
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(location(&res).starts_with("https://cas.example.edu/cas/login?service="));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unreachable_cas_server_fails_login_with_403() {
        let (app, store) = app_for(Err(CasError::network("connection refused")));
        let res = app
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn logout_unbinds_and_redirects_to_the_cas_server() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let cookie = login(&app).await;
        assert_eq!(store.len(), 1);

        let res = app
            .oneshot(get_req("/accounts/logout/", Some(cookie.as_str())))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            location(&res),
            "https://cas.example.edu/cas/logout?url=http%3A%2F%2Fapp.example.edu%2F"
        );
        assert!(session_cookie(&res).ends_with('='));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn trusted_single_logout_ends_the_session() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        login(&app).await;

        let res = app
            .oneshot(slo_req(Some(CAS_HOST_IP), "ST-1-abc"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn untrusted_single_logout_is_refused() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        login(&app).await;

        let res = app
            .clone()
            .oneshot(slo_req(Some([192, 0, 2, 7]), "ST-1-abc"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(store.len(), 1);

        let res = app.oneshot(slo_req(None, "ST-1-abc")).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_ticket_mid_request_logs_out_and_retries_the_same_path() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let cookie = login(&app).await;

        let res = app
            .oneshot(get_req("/admin/report?year=2024", Some(cookie.as_str())))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/admin/report");
        assert!(session_cookie(&res).ends_with('='));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unrecoverable_ticket_failure_mid_request_keeps_the_session() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let cookie = login(&app).await;

        let res = app
            .oneshot(get_req("/admin/upstream", Some(cookie.as_str())))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ticket_redemption_runs_on_a_spawned_task() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = tokio::spawn(
            app.oneshot(get_req("/accounts/login/?ticket=ST-9-spawn&next=%2Fadmin%2F", None)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/admin/");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn login_cookie_carries_the_session_lifetime() {
        let (app, _) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let res = app
            .oneshot(get_req("/accounts/login/?ticket=ST-1-abc", None))
            .await
            .unwrap();
        let set = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        let expected = format!("Max-Age={}", config().cookie.max_age.as_secs());
        assert!(set.ends_with(&expected));
    }

    #[tokio::test]
    async fn over_age_session_is_treated_as_anonymous() {
        let (app, store) = app_for(Ok(AuthenticatedIdentity::new("alice")));
        let cookie = login(&app).await;
        let id: SessionId = cookie.split_once('=').unwrap().1.parse().unwrap();

        let mut session = store.load(id).unwrap().unwrap();
        session.created_at -= chrono::Duration::days(3650);
        session.expires_at = session.created_at + chrono::Duration::hours(8);
        store.save(session).unwrap();

        let res = app.oneshot(get_req("/admin/", Some(cookie.as_str()))).await.unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/accounts/login/?next=%2Fadmin%2F");
        assert!(store.is_empty());
    }
}
