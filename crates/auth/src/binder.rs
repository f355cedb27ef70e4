//! Binds verified identities to local sessions and tears them down again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use casguard_core::{CasResult, SessionId};

use crate::session::{Session, SessionStore};
use crate::{AuthenticatedIdentity, ServiceTicket, StaffPolicy};

/// Owns the lifecycle of local sessions.
///
/// Every mutation is a single store call, so other requests observe either
/// the complete session or none at all.
#[derive(Clone)]
pub struct SessionBinder {
    store: Arc<dyn SessionStore>,
    staff: StaffPolicy,
    max_age: chrono::Duration,
}

/// Session lifetime unless configured otherwise.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(8 * 60 * 60);

impl SessionBinder {
    pub fn new(store: Arc<dyn SessionStore>, staff: StaffPolicy) -> Self {
        Self {
            store,
            staff,
            max_age: to_chrono(DEFAULT_SESSION_MAX_AGE),
        }
    }

    /// Sessions older than `max_age` count as logged out.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = to_chrono(max_age);
        self
    }

    /// Create a fresh session for `identity`.
    ///
    /// A previous session carried by the client is dropped first; login
    /// always issues a new id so a pre-login id cannot be fixated.
    pub fn bind(
        &self,
        previous: Option<SessionId>,
        identity: AuthenticatedIdentity,
        ticket: ServiceTicket,
    ) -> CasResult<Session> {
        if let Some(previous) = previous {
            self.store.remove(previous)?;
        }

        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            is_staff: self.staff.is_staff(&identity),
            identity,
            ticket,
            created_at: now,
            expires_at: now + self.max_age,
        };
        self.store.save(session.clone())?;

        tracing::info!(
            session_id = %session.id,
            username = %session.identity.username,
            is_staff = session.is_staff,
            "session bound"
        );
        Ok(session)
    }

    /// Drop a session. Unbinding an absent session is a no-op.
    pub fn unbind(&self, id: SessionId) -> CasResult<bool> {
        let removed = self.store.remove(id)?;
        if removed {
            tracing::info!(session_id = %id, "session unbound");
        } else {
            tracing::debug!(session_id = %id, "unbind of absent session ignored");
        }
        Ok(removed)
    }

    /// Drop whichever session was created by `ticket` (single logout).
    pub fn unbind_by_ticket(&self, ticket: &ServiceTicket) -> CasResult<Option<SessionId>> {
        let removed = self.store.remove_by_ticket(ticket)?;
        match removed {
            Some(id) => tracing::info!(session_id = %id, "session ended by single logout"),
            None => tracing::debug!(ticket = %ticket, "single logout for unknown ticket ignored"),
        }
        Ok(removed)
    }

    /// The live session for `id`. Expired sessions are evicted and reported absent.
    pub fn current(&self, id: SessionId) -> CasResult<Option<Session>> {
        match self.store.load(id)? {
            Some(session) if session.is_expired(Utc::now()) => {
                self.store.remove(id)?;
                tracing::debug!(session_id = %id, "expired session evicted");
                Ok(None)
            }
            Some(session) => Ok(Some(session)),
            None => {
                // `load` hides expired records; this drops one if it is still held.
                self.store.remove(id)?;
                Ok(None)
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
