use std::collections::HashSet;

use casguard_core::{CasError, CasResult};

use crate::AuthenticatedIdentity;

/// Decides which identities carry the staff flag.
///
/// Stands in for the host's user directory: staff are either listed by
/// username or recognized by a released CAS attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffPolicy {
    usernames: HashSet<String>,
    attribute: Option<(String, String)>,
}

impl StaffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usernames<I, S>(mut self, usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.usernames.extend(
            usernames
                .into_iter()
                .map(Into::into)
                .filter(|u: &String| !u.is_empty()),
        );
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute = Some((name.into(), value.into()));
        self
    }

    /// Parse a `name=value` attribute rule.
    pub fn parse_attribute_rule(rule: &str) -> CasResult<(String, String)> {
        match rule.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(CasError::config(format!(
                "staff attribute rule '{rule}' must look like name=value"
            ))),
        }
    }

    pub fn is_staff(&self, identity: &AuthenticatedIdentity) -> bool {
        if self.usernames.contains(identity.username.as_str()) {
            return true;
        }
        self.attribute
            .as_ref()
            .is_some_and(|(name, value)| identity.has_attribute_value(name, value))
    }
}
