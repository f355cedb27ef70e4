//! `casguard-auth`: CAS protocol and session logic.
//!
//! This crate is intentionally decoupled from the HTTP framework: it talks to
//! the CAS server, decides trust and owns session state, and leaves request
//! routing to the API layer.

pub mod binder;
pub mod identity;
pub mod logout;
pub mod protocol;
pub mod session;
pub mod staff;
pub mod ticket;
pub mod trust;
pub mod validator;

pub use binder::{DEFAULT_SESSION_MAX_AGE, SessionBinder};
pub use identity::{AuthenticatedIdentity, Username};
pub use logout::LogoutRequest;
pub use protocol::CasVersion;
pub use session::{InMemorySessionStore, Session, SessionStore, SessionStoreError};
pub use staff::StaffPolicy;
pub use ticket::ServiceTicket;
pub use trust::{
    AllowList, CachingResolver, DenyReason, HostResolver, ResolveError, StaticResolver,
    SystemResolver, TrustCheck, TrustConfig, TrustDecision,
};
pub use validator::{HttpTicketValidator, TicketValidator};
