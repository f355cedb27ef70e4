//! Reverse-DNS trust check for single-logout pushes.
//!
//! A logout push carries no credentials, so the only thing vouching for it
//! is the peer address. The peer is resolved to a hostname and compared
//! against the configured allow-list.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;

use casguard_observability::SECURITY_TARGET;

/// Maximum number of cached reverse lookups.
const MAX_CACHE_ENTRIES: u64 = 1_024;

/// Hosts allowed to push single-logout requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// Any host that resolves is trusted.
    AllowAll,
    /// Only these (normalized) hostnames are trusted.
    Hosts(HashSet<String>),
}

impl AllowList {
    pub fn permits(&self, host: &str) -> bool {
        match self {
            AllowList::AllowAll => true,
            AllowList::Hosts(hosts) => hosts.contains(&normalize_host(host)),
        }
    }
}

/// Read-only trust configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    allow: AllowList,
}

impl TrustConfig {
    /// Build from configured hostnames. No hostnames means every host is trusted.
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts: HashSet<String> = hosts
            .into_iter()
            .map(|h| normalize_host(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();

        if hosts.is_empty() {
            tracing::warn!(
                target: SECURITY_TARGET,
                "no single-logout allow-list configured: logout requests from ANY host \
                 will be honored; set CAS_LOGOUT_REQUEST_ALLOWED to restrict them"
            );
            return Self {
                allow: AllowList::AllowAll,
            };
        }

        Self {
            allow: AllowList::Hosts(hosts),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    pub fn is_wide_open(&self) -> bool {
        matches!(self.allow, AllowList::AllowAll)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no hostname for {0}")]
    NoHostname(IpAddr),

    #[error("reverse lookup failed: {0}")]
    Lookup(String),
}

/// Reverse DNS seam.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError>;
}

#[async_trait]
impl<R> HostResolver for Arc<R>
where
    R: HostResolver + ?Sized,
{
    async fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        (**self).reverse(addr).await
    }
}

/// Resolves through the operating system (`getnameinfo`) on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        let host = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .map_err(|e| ResolveError::Lookup(format!("resolver task failed: {e}")))?
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;

        // getnameinfo falls back to the numeric form when there is no PTR record.
        if host.parse::<IpAddr>().is_ok() {
            return Err(ResolveError::NoHostname(addr));
        }
        Ok(host)
    }
}

/// Fixed address → hostname table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<IpAddr, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, addr: IpAddr, host: impl Into<String>) -> Self {
        self.entries.insert(addr, host.into());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        self.entries
            .get(&addr)
            .cloned()
            .ok_or(ResolveError::NoHostname(addr))
    }
}

/// Caches successful lookups for a fixed TTL. Failures are not cached.
#[derive(Clone)]
pub struct CachingResolver<R> {
    inner: R,
    cache: Cache<IpAddr, String>,
}

impl<R: HostResolver> CachingResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHE_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl<R: HostResolver> HostResolver for CachingResolver<R> {
    async fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        if let Some(host) = self.cache.get(&addr).await {
            return Ok(host);
        }
        let host = self.inner.reverse(addr).await?;
        self.cache.insert(addr, host.clone()).await;
        Ok(host)
    }
}

/// Why a peer was not trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingPeer,
    MalformedAddress(String),
    ResolutionFailed(String),
    HostNotAllowed(String),
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DenyReason::MissingPeer => f.write_str("no peer address"),
            DenyReason::MalformedAddress(a) => write!(f, "malformed peer address '{a}'"),
            DenyReason::ResolutionFailed(e) => write!(f, "reverse lookup failed: {e}"),
            DenyReason::HostNotAllowed(h) => write!(f, "host '{h}' is not in the allow-list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    Allowed { host: String },
    Denied(DenyReason),
}

impl TrustDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TrustDecision::Allowed { .. })
    }
}

/// Decides whether a peer may push single-logout requests.
#[derive(Clone)]
pub struct TrustCheck {
    config: TrustConfig,
    resolver: Arc<dyn HostResolver>,
}

impl TrustCheck {
    pub fn new(config: TrustConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Never fails: anything that goes wrong while establishing the peer's
    /// identity is a denial.
    pub async fn check(&self, peer: &str) -> TrustDecision {
        let peer = peer.trim();
        if peer.is_empty() {
            return TrustDecision::Denied(DenyReason::MissingPeer);
        }

        let addr: IpAddr = match peer.parse() {
            Ok(addr) => addr,
            Err(_) => return TrustDecision::Denied(DenyReason::MalformedAddress(peer.to_string())),
        };

        let host = match self.resolver.reverse(addr).await {
            Ok(host) => normalize_host(&host),
            Err(e) => return TrustDecision::Denied(DenyReason::ResolutionFailed(e.to_string())),
        };

        if self.config.allow_list().permits(&host) {
            if self.config.is_wide_open() {
                tracing::warn!(
                    target: SECURITY_TARGET,
                    peer = %addr,
                    host = %host,
                    "honoring logout request without an allow-list"
                );
            }
            TrustDecision::Allowed { host }
        } else {
            TrustDecision::Denied(DenyReason::HostNotAllowed(host))
        }
    }
}
