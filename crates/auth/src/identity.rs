use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Username asserted by the CAS server.
///
/// Opaque at this layer; CAS deployments use uids, e-mail addresses or
/// employee numbers interchangeably.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A principal verified by the CAS server.
///
/// Produced by a successful ticket validation and owned by the session once bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub username: Username,

    /// Released attributes (CAS 3.0). Values are multi-valued by protocol.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Proxy-granting ticket IOU, when the validation requested one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_granting_ticket: Option<String>,
}

impl AuthenticatedIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: Username::new(username),
            attributes: BTreeMap::new(),
            proxy_granting_ticket: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.entry(name.into()).or_default().push(value.into());
        self
    }

    /// True when `name` was released with `value` among its values.
    pub fn has_attribute_value(&self, name: &str, value: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }
}
