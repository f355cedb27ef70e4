//! Request intent classification.
//!
//! The interceptor never inspects handlers; it acts on the intent assigned
//! here (or by the host's own routing layer, via a request extension).

use crate::config::CasConfig;

/// What the interceptor should treat a request as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestIntent {
    Login,
    Logout,
    /// Requires an authenticated staff session.
    Protected,
    Other,
}

/// Which paths count as protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectedRule {
    /// Every path starting with this prefix.
    Prefix(String),
    /// The admin area: `/admin` and everything below `/admin/`.
    AdminPaths,
}

impl ProtectedRule {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            ProtectedRule::Prefix(prefix) => path.starts_with(prefix.as_str()),
            ProtectedRule::AdminPaths => path == "/admin" || path.starts_with("/admin/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    login_path: String,
    logout_path: String,
    protected: ProtectedRule,
}

impl IntentClassifier {
    pub fn new(
        login_path: impl Into<String>,
        logout_path: impl Into<String>,
        protected: ProtectedRule,
    ) -> Self {
        Self {
            login_path: login_path.into(),
            logout_path: logout_path.into(),
            protected,
        }
    }

    pub fn from_config(config: &CasConfig) -> Self {
        Self::new(
            config.login_path.clone(),
            config.logout_path.clone(),
            config.protected.clone(),
        )
    }

    pub fn classify(&self, path: &str) -> RequestIntent {
        if same_endpoint(path, &self.login_path) {
            RequestIntent::Login
        } else if same_endpoint(path, &self.logout_path) {
            RequestIntent::Logout
        } else if self.protected.matches(path) {
            RequestIntent::Protected
        } else {
            RequestIntent::Other
        }
    }
}

/// Entry points match with or without their trailing slash.
fn same_endpoint(path: &str, endpoint: &str) -> bool {
    path.trim_end_matches('/') == endpoint.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(rule: ProtectedRule) -> IntentClassifier {
        IntentClassifier::new("/accounts/login/", "/accounts/logout/", rule)
    }

    #[test]
    fn entry_points_are_recognized() {
        let c = classifier(ProtectedRule::AdminPaths);
        assert_eq!(c.classify("/accounts/login/"), RequestIntent::Login);
        assert_eq!(c.classify("/accounts/login"), RequestIntent::Login);
        assert_eq!(c.classify("/accounts/logout/"), RequestIntent::Logout);
        assert_eq!(c.classify("/accounts/login/extra"), RequestIntent::Other);
    }

    #[test]
    fn admin_paths_rule() {
        let c = classifier(ProtectedRule::AdminPaths);
        assert_eq!(c.classify("/admin"), RequestIntent::Protected);
        assert_eq!(c.classify("/admin/"), RequestIntent::Protected);
        assert_eq!(c.classify("/admin/users/1"), RequestIntent::Protected);
        assert_eq!(c.classify("/administrivia"), RequestIntent::Other);
        assert_eq!(c.classify("/"), RequestIntent::Other);
    }

    #[test]
    fn prefix_rule() {
        let c = classifier(ProtectedRule::Prefix("/staff/".to_string()));
        assert_eq!(c.classify("/staff/reports"), RequestIntent::Protected);
        assert_eq!(c.classify("/admin/"), RequestIntent::Other);
    }
}
