use serde::{Deserialize, Serialize};

use casguard_core::{CasError, CasResult};

/// Longest ticket accepted. The CAS protocol recommends services accept
/// tickets of at least this length.
pub const MAX_TICKET_LEN: usize = 256;

/// A single-use service ticket issued by the CAS server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTicket(String);

impl ServiceTicket {
    /// Check the shape of a raw `ticket` parameter.
    ///
    /// Shape failures are reported as `TicketInvalid` so callers treat them
    /// exactly like a server-side rejection.
    pub fn parse(raw: &str) -> CasResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CasError::ticket_invalid("empty ticket"));
        }
        if raw.len() > MAX_TICKET_LEN {
            return Err(CasError::ticket_invalid(format!(
                "ticket longer than {MAX_TICKET_LEN} characters"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CasError::ticket_invalid(
                "ticket contains whitespace or control characters",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ServiceTicket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_tickets() {
        let t = ServiceTicket::parse("ST-1-abcDEF123-cas01").unwrap();
        assert_eq!(t.as_str(), "ST-1-abcDEF123-cas01");

        // Surrounding whitespace from sloppy clients is tolerated.
        let t = ServiceTicket::parse("  ST-2-x  ").unwrap();
        assert_eq!(t.as_str(), "ST-2-x");
    }

    #[test]
    fn rejects_empty_oversized_and_embedded_whitespace() {
        assert!(matches!(ServiceTicket::parse(""), Err(CasError::TicketInvalid(_))));
        assert!(matches!(ServiceTicket::parse("   "), Err(CasError::TicketInvalid(_))));
        assert!(ServiceTicket::parse(&"x".repeat(MAX_TICKET_LEN + 1)).is_err());
        assert!(ServiceTicket::parse(&"x".repeat(MAX_TICKET_LEN)).is_ok());
        assert!(ServiceTicket::parse("ST-1 abc").is_err());
        assert!(ServiceTicket::parse("ST-1\u{0}abc").is_err());
    }
}
