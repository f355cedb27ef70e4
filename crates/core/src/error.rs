//! Error taxonomy for the CAS interception layer.

use thiserror::Error;

/// Result type used across the casguard crates.
pub type CasResult<T> = Result<T, CasError>;

/// Everything that can go wrong between a browser, this service and the CAS server.
///
/// The first group comes out of ticket validation; the rest are trust,
/// configuration and storage failures. HTTP mapping lives in the API crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CasError {
    /// The CAS server rejected the ticket (unknown, already used, malformed).
    #[error("ticket invalid: {0}")]
    TicketInvalid(String),

    /// The CAS server reported the ticket as expired.
    #[error("ticket expired: {0}")]
    TicketExpired(String),

    /// The ticket was issued for a different service URL.
    #[error("service mismatch: {0}")]
    ServiceMismatch(String),

    /// The CAS server could not be reached or answered with a non-success status.
    #[error("network failure talking to CAS server: {0}")]
    NetworkFailure(String),

    /// The CAS server answered, but not with a recognizable validation payload.
    #[error("malformed CAS response: {0}")]
    MalformedResponse(String),

    /// A single-logout push came from a host that failed the trust check.
    #[error("logout request from untrusted source '{peer}'")]
    UntrustedLogoutSource { peer: String },

    /// A single-logout payload could not be parsed.
    #[error("invalid logout request: {0}")]
    InvalidLogoutRequest(String),

    /// The identity-attachment layer is not installed in front of the interceptor.
    #[error(
        "the CAS interceptor requires the session identity layer to be installed \
         in front of it; attach it before applying the CAS guard"
    )]
    MissingIdentityMiddleware,

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The session store could not serve the request.
    #[error("session store unavailable: {0}")]
    SessionStore(String),

    /// Startup configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CasError {
    pub fn ticket_invalid(msg: impl Into<String>) -> Self {
        Self::TicketInvalid(msg.into())
    }

    pub fn ticket_expired(msg: impl Into<String>) -> Self {
        Self::TicketExpired(msg.into())
    }

    pub fn service_mismatch(msg: impl Into<String>) -> Self {
        Self::ServiceMismatch(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures produced by validating a service ticket.
    pub fn is_ticket_failure(&self) -> bool {
        matches!(
            self,
            Self::TicketInvalid(_)
                | Self::TicketExpired(_)
                | Self::ServiceMismatch(_)
                | Self::NetworkFailure(_)
                | Self::MalformedResponse(_)
        )
    }

    /// True when a ticket failure raised while serving a request means the
    /// session's ticket went stale and a fresh login should be attempted.
    pub fn is_recoverable_in_use(&self) -> bool {
        matches!(self, Self::TicketInvalid(_) | Self::TicketExpired(_))
    }
}
