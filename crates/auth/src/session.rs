//! Server-side session records and their storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use casguard_core::{CasError, SessionId};

use crate::{AuthenticatedIdentity, ServiceTicket};

/// A bound (logged-in) session.
///
/// There is no "anonymous" variant: a session id with no record is logged out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub identity: AuthenticatedIdentity,
    pub is_staff: bool,
    /// Ticket that created the session; single-logout pushes reference it.
    pub ticket: ServiceTicket,
    pub created_at: DateTime<Utc>,
    /// After this instant the session counts as logged out.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<SessionStoreError> for CasError {
    fn from(value: SessionStoreError) -> Self {
        CasError::SessionStore(value.to_string())
    }
}

/// Concurrency-safe key/value storage for sessions.
///
/// Each call must be atomic with respect to every other call on the same
/// session id; in particular `save` publishes the whole record at once.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Insert or replace a session record.
    fn save(&self, session: Session) -> Result<(), SessionStoreError>;

    /// Remove a session. Returns whether a record existed.
    fn remove(&self, id: SessionId) -> Result<bool, SessionStoreError>;

    /// Remove the session created by `ticket`, returning its id if one existed.
    fn remove_by_ticket(&self, ticket: &ServiceTicket)
    -> Result<Option<SessionId>, SessionStoreError>;
}

impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    fn load(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        (**self).load(id)
    }

    fn save(&self, session: Session) -> Result<(), SessionStoreError> {
        (**self).save(session)
    }

    fn remove(&self, id: SessionId) -> Result<bool, SessionStoreError> {
        (**self).remove(id)
    }

    fn remove_by_ticket(
        &self,
        ticket: &ServiceTicket,
    ) -> Result<Option<SessionId>, SessionStoreError> {
        (**self).remove_by_ticket(ticket)
    }
}

/// Minimum time between sweeps of expired records.
const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    by_ticket: HashMap<ServiceTicket, SessionId>,
    last_sweep: DateTime<Utc>,
}

impl Inner {
    fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Inner {
            sessions, by_ticket, ..
        } = &mut *self;
        let before = sessions.len();
        sessions.retain(|_, session| {
            let keep = !session.is_expired(now);
            if !keep {
                by_ticket.remove(&session.ticket);
            }
            keep
        });
        self.last_sweep = now;
        before - self.sessions.len()
    }
}

/// In-memory session store for single-process deployments and tests.
///
/// Sessions and the ticket index share one lock so they never disagree.
/// Expired records are never returned, and are swept out on `save` at most
/// once per minute.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<Inner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.sessions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SessionStoreError {
    SessionStoreError::Unavailable("lock poisoned".to_string())
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .sessions
            .get(&id)
            .filter(|s| !s.is_expired(Utc::now()))
            .cloned())
    }

    fn save(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let now = Utc::now();
        if now - inner.last_sweep >= Duration::seconds(SWEEP_INTERVAL_SECS) {
            let swept = inner.sweep_expired(now);
            if swept > 0 {
                tracing::debug!(swept, "expired sessions swept");
            }
        }
        if let Some(previous) = inner.sessions.get(&session.id).map(|s| s.ticket.clone()) {
            inner.by_ticket.remove(&previous);
        }
        inner.by_ticket.insert(session.ticket.clone(), session.id);
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    fn remove(&self, id: SessionId) -> Result<bool, SessionStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        match inner.sessions.remove(&id) {
            Some(session) => {
                inner.by_ticket.remove(&session.ticket);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_by_ticket(
        &self,
        ticket: &ServiceTicket,
    ) -> Result<Option<SessionId>, SessionStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let Some(id) = inner.by_ticket.remove(ticket) else {
            return Ok(None);
        };
        inner.sessions.remove(&id);
        Ok(Some(id))
    }
}
