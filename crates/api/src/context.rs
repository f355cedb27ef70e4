use casguard_auth::Session;
use casguard_core::SessionId;

/// Per-request view of the caller's session, attached by the identity layer.
///
/// This must be present on every request that reaches the CAS interceptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    session_id: Option<SessionId>,
    session: Option<Session>,
}

impl SessionContext {
    /// A caller without a bound session; `presented` is the id from their cookie, if any.
    pub fn anonymous(presented: Option<SessionId>) -> Self {
        Self {
            session_id: presented,
            session: None,
        }
    }

    pub fn authenticated(session: Session) -> Self {
        Self {
            session_id: Some(session.id),
            session: Some(session),
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_staff)
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.identity.username.as_str())
    }
}
