//! Startup configuration.
//!
//! Read once, then shared immutably (`Arc<CasConfig>`) with every component.

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use casguard_auth::{CasVersion, DEFAULT_SESSION_MAX_AGE, StaffPolicy, TrustConfig};
use casguard_core::{CasError, CasResult};

use crate::intent::ProtectedRule;

pub const DEFAULT_LOGIN_PATH: &str = "/accounts/login/";
pub const DEFAULT_LOGOUT_PATH: &str = "/accounts/logout/";
pub const DEFAULT_SESSION_COOKIE: &str = "casguard_session";

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookieConfig {
    pub name: String,
    pub secure: bool,
    /// Lifetime of the session record and of the cookie carrying it.
    pub max_age: Duration,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_COOKIE.to_string(),
            secure: true,
            max_age: DEFAULT_SESSION_MAX_AGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CasConfig {
    /// CAS server base URL, e.g. `https://sso.example.edu/cas`.
    pub server_url: Url,
    pub version: CasVersion,
    pub login_path: String,
    pub logout_path: String,
    pub protected: ProtectedRule,
    /// Hosts allowed to push single-logout requests. Empty trusts every host.
    pub logout_allowed_hosts: Vec<String>,
    /// Default post-login / post-logout destination.
    pub redirect_url: String,
    pub ignore_referer: bool,
    /// Also end the CAS server's SSO session on logout.
    pub logout_completely: bool,
    pub renew: bool,
    pub validate_timeout: Duration,
    /// Public base URL of this service; derived from `Host` when unset.
    pub service_base_url: Option<Url>,
    pub staff_users: Vec<String>,
    pub staff_attribute: Option<(String, String)>,
    /// Reverse-DNS cache TTL; `None` disables caching.
    pub dns_cache_ttl: Option<Duration>,
    pub cookie: SessionCookieConfig,
    pub bind_addr: SocketAddr,
}

impl CasConfig {
    /// Configuration with defaults for everything but the CAS server.
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            version: CasVersion::V2,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            protected: ProtectedRule::AdminPaths,
            logout_allowed_hosts: Vec::new(),
            redirect_url: "/".to_string(),
            ignore_referer: false,
            logout_completely: true,
            renew: false,
            validate_timeout: Duration::from_secs(5),
            service_base_url: None,
            staff_users: Vec::new(),
            staff_attribute: None,
            dns_cache_ttl: Some(Duration::from_secs(60)),
            cookie: SessionCookieConfig::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> CasResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> CasResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server_url = get("CAS_SERVER_URL")
            .ok_or_else(|| CasError::config("CAS_SERVER_URL must be set"))?;
        let server_url = parse_url("CAS_SERVER_URL", &server_url)?;

        let mut config = Self::new(server_url);

        if let Some(v) = get("CAS_VERSION") {
            config.version = v.parse()?;
        }
        if let Some(v) = get("CAS_ADMIN_PREFIX") {
            config.protected = ProtectedRule::Prefix(parse_path("CAS_ADMIN_PREFIX", &v)?);
        }
        if let Some(v) = get("CAS_LOGOUT_REQUEST_ALLOWED") {
            config.logout_allowed_hosts = split_list(&v);
        }
        if let Some(v) = get("CAS_REDIRECT_URL") {
            config.redirect_url = v;
        }
        if let Some(v) = get("CAS_IGNORE_REFERER") {
            config.ignore_referer = parse_bool("CAS_IGNORE_REFERER", &v)?;
        }
        if let Some(v) = get("CAS_LOGOUT_COMPLETELY") {
            config.logout_completely = parse_bool("CAS_LOGOUT_COMPLETELY", &v)?;
        }
        if let Some(v) = get("CAS_RENEW") {
            config.renew = parse_bool("CAS_RENEW", &v)?;
        }
        if let Some(v) = get("CAS_VALIDATE_TIMEOUT_SECS") {
            let secs = parse_u64("CAS_VALIDATE_TIMEOUT_SECS", &v)?;
            if secs == 0 {
                return Err(CasError::config("CAS_VALIDATE_TIMEOUT_SECS must be positive"));
            }
            config.validate_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("CAS_SERVICE_BASE_URL") {
            config.service_base_url = Some(parse_url("CAS_SERVICE_BASE_URL", &v)?);
        }
        if let Some(v) = get("CAS_LOGIN_PATH") {
            config.login_path = parse_path("CAS_LOGIN_PATH", &v)?;
        }
        if let Some(v) = get("CAS_LOGOUT_PATH") {
            config.logout_path = parse_path("CAS_LOGOUT_PATH", &v)?;
        }
        if let Some(v) = get("CAS_STAFF_USERS") {
            config.staff_users = split_list(&v);
        }
        if let Some(v) = get("CAS_STAFF_ATTRIBUTE") {
            config.staff_attribute = Some(StaffPolicy::parse_attribute_rule(&v)?);
        }
        if let Some(v) = get("CAS_DNS_CACHE_TTL_SECS") {
            let secs = parse_u64("CAS_DNS_CACHE_TTL_SECS", &v)?;
            config.dns_cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = get("SESSION_COOKIE_SECURE") {
            config.cookie.secure = parse_bool("SESSION_COOKIE_SECURE", &v)?;
        }
        if let Some(v) = get("SESSION_MAX_AGE_SECS") {
            let secs = parse_u64("SESSION_MAX_AGE_SECS", &v)?;
            if secs == 0 {
                return Err(CasError::config("SESSION_MAX_AGE_SECS must be positive"));
            }
            config.cookie.max_age = Duration::from_secs(secs);
        }
        if let Some(v) = get("BIND_ADDR") {
            config.bind_addr = v
                .parse()
                .map_err(|e| CasError::config(format!("BIND_ADDR: {e}")))?;
        }

        if config.login_path == config.logout_path {
            return Err(CasError::config(
                "CAS_LOGIN_PATH and CAS_LOGOUT_PATH must differ",
            ));
        }

        Ok(config)
    }

    pub fn staff_policy(&self) -> StaffPolicy {
        let policy = StaffPolicy::new().with_usernames(self.staff_users.iter().cloned());
        match &self.staff_attribute {
            Some((name, value)) => policy.with_attribute(name.clone(), value.clone()),
            None => policy,
        }
    }

    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig::from_hosts(&self.logout_allowed_hosts)
    }
}

fn parse_url(key: &str, raw: &str) -> CasResult<Url> {
    let url = Url::parse(raw).map_err(|e| CasError::config(format!("{key}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CasError::config(format!(
            "{key}: unsupported scheme '{other}'"
        ))),
    }
}

fn parse_path(key: &str, raw: &str) -> CasResult<String> {
    if raw.starts_with('/') {
        Ok(raw.to_string())
    } else {
        Err(CasError::config(format!("{key} must start with '/'")))
    }
}

fn parse_bool(key: &str, raw: &str) -> CasResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CasError::config(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

fn parse_u64(key: &str, raw: &str) -> CasResult<u64> {
    raw.parse()
        .map_err(|e| CasError::config(format!("{key}: {e}")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
