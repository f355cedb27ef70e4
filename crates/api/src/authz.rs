//! Staff gate for protected paths.

use crate::context::SessionContext;

/// Outcome of the staff gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Authenticated but not staff. Must not redirect to login: the user is
    /// already logged in and would loop.
    Forbidden,
    LoginRequired,
}

pub fn staff_gate(context: &SessionContext) -> GateDecision {
    match (context.is_authenticated(), context.is_staff()) {
        (true, true) => GateDecision::Allow,
        (true, false) => GateDecision::Forbidden,
        (false, _) => GateDecision::LoginRequired,
    }
}
