//! CAS protocol surface: endpoint URLs and validation response parsing.
//!
//! Pure functions only; the HTTP exchange lives in `validator`.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use url::Url;

use casguard_core::{CasError, CasResult};

use crate::{AuthenticatedIdentity, Username};

/// Upper bound on a validation response body we are willing to parse.
pub const MAX_RESPONSE_LEN: usize = 256 * 1024;

/// CAS protocol revision spoken with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CasVersion {
    /// `/validate`, plain-text `yes`/`no` answer.
    V1,
    /// `/serviceValidate`, XML answer.
    #[default]
    V2,
    /// `/p3/serviceValidate`, XML answer with released attributes.
    V3,
}

impl CasVersion {
    pub fn validation_path(&self) -> &'static str {
        match self {
            CasVersion::V1 => "validate",
            CasVersion::V2 => "serviceValidate",
            CasVersion::V3 => "p3/serviceValidate",
        }
    }

    /// Query parameter carrying the post-logout destination.
    fn logout_redirect_param(&self) -> &'static str {
        match self {
            CasVersion::V1 | CasVersion::V2 => "url",
            CasVersion::V3 => "service",
        }
    }
}

impl core::str::FromStr for CasVersion {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" | "1.0" => Ok(CasVersion::V1),
            "2" | "2.0" => Ok(CasVersion::V2),
            "3" | "3.0" => Ok(CasVersion::V3),
            other => Err(CasError::config(format!("unsupported CAS version '{other}'"))),
        }
    }
}

/// Resolve `path` below the server base URL, whether or not the base ends in `/`.
fn endpoint(server: &Url, path: &str) -> Url {
    let mut url = server.clone();
    let base = server.path().trim_end_matches('/');
    url.set_path(&format!("{base}/{path}"));
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// URL the browser is sent to for primary authentication.
pub fn login_url(server: &Url, service: &str, renew: bool) -> Url {
    let mut url = endpoint(server, "login");
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("service", service);
        if renew {
            q.append_pair("renew", "true");
        }
    }
    url
}

/// URL of the CAS server's logout page, optionally bouncing back to `redirect`.
pub fn logout_url(server: &Url, version: CasVersion, redirect: Option<&str>) -> Url {
    let mut url = endpoint(server, "logout");
    if let Some(redirect) = redirect {
        url.query_pairs_mut()
            .append_pair(version.logout_redirect_param(), redirect);
    }
    url
}

/// Back-channel URL used to validate `ticket` for `service`.
pub fn validation_url(
    server: &Url,
    version: CasVersion,
    ticket: &str,
    service: &str,
    renew: bool,
) -> Url {
    let mut url = endpoint(server, version.validation_path());
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("ticket", ticket);
        q.append_pair("service", service);
        if renew {
            q.append_pair("renew", "true");
        }
    }
    url
}

/// Parse a validation response body for the given protocol version.
pub fn parse_validation_response(
    version: CasVersion,
    body: &str,
) -> CasResult<AuthenticatedIdentity> {
    if body.len() > MAX_RESPONSE_LEN {
        return Err(CasError::malformed("validation response too large"));
    }
    match version {
        CasVersion::V1 => parse_v1_response(body),
        CasVersion::V2 | CasVersion::V3 => parse_service_response(body),
    }
}

/// CAS 1.0: `yes\n<user>\n` or `no\n\n`.
pub fn parse_v1_response(body: &str) -> CasResult<AuthenticatedIdentity> {
    let mut lines = body.lines().map(str::trim);
    match lines.next() {
        Some("yes") => match lines.next() {
            Some(user) if !user.is_empty() => Ok(AuthenticatedIdentity::new(user)),
            _ => Err(CasError::malformed("CAS 1.0 success without a username")),
        },
        Some("no") => Err(CasError::ticket_invalid("CAS server rejected the ticket")),
        _ => Err(CasError::malformed("expected 'yes' or 'no' from CAS 1.0 endpoint")),
    }
}

/// CAS 2.0/3.0 `<cas:serviceResponse>` document.
pub fn parse_service_response(xml: &str) -> CasResult<AuthenticatedIdentity> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut saw_success = false;
    let mut username: Option<String> = None;
    let mut pgt: Option<String> = None;
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut failure: Option<(String, String)> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = local_name(e);
                if local == "authenticationSuccess" {
                    saw_success = true;
                } else if local == "authenticationFailure" {
                    failure = Some((failure_code(e), String::new()));
                }
                stack.push(local);
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                let local = local_name(e);
                if local == "authenticationFailure" {
                    failure = Some((failure_code(e), String::new()));
                } else if parent_is(&stack, "attributes") {
                    attributes.entry(local).or_default().push(String::new());
                }
            }
            Ok(Event::Text(ref e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|e| CasError::malformed(format!("XML text error: {e}")))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(_)) => {
                let Some(local) = stack.pop() else {
                    return Err(CasError::malformed("unbalanced XML"));
                };
                let value = std::mem::take(&mut text);
                match local.as_str() {
                    "user" if parent_is(&stack, "authenticationSuccess") => {
                        username = Some(value.trim().to_string());
                    }
                    "proxyGrantingTicket" if parent_is(&stack, "authenticationSuccess") => {
                        pgt = Some(value.trim().to_string());
                    }
                    "authenticationFailure" => {
                        if let Some((_, message)) = failure.as_mut() {
                            *message = value.trim().to_string();
                        }
                    }
                    name if parent_is(&stack, "attributes") => {
                        attributes
                            .entry(name.to_string())
                            .or_default()
                            .push(value.trim().to_string());
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CasError::malformed(format!("XML parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some((code, message)) = failure {
        return Err(classify_failure(&code, &message));
    }

    if !saw_success {
        return Err(CasError::malformed(
            "no authenticationSuccess or authenticationFailure element",
        ));
    }

    let username = username
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CasError::malformed("authenticationSuccess without cas:user"))?;

    Ok(AuthenticatedIdentity {
        username: Username::new(username),
        attributes,
        proxy_granting_ticket: pgt.filter(|p| !p.is_empty()),
    })
}

/// Map a CAS `authenticationFailure` code to the error taxonomy.
pub fn classify_failure(code: &str, message: &str) -> CasError {
    let detail = if message.is_empty() {
        code.to_string()
    } else {
        format!("{code}: {message}")
    };

    match code {
        "INVALID_SERVICE" => CasError::ServiceMismatch(detail),
        "INVALID_TICKET" | "INVALID_TICKET_SPEC" | "INVALID_REQUEST" => {
            if message.to_ascii_lowercase().contains("expired") {
                CasError::TicketExpired(detail)
            } else {
                CasError::TicketInvalid(detail)
            }
        }
        _ => CasError::TicketInvalid(detail),
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().into_inner()).to_string()
}

fn failure_code(e: &BytesStart<'_>) -> String {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().into_inner() == b"code")
        .map(|a| String::from_utf8_lossy(&a.value).trim().to_string())
        .unwrap_or_default()
}

fn parent_is(stack: &[String], name: &str) -> bool {
    stack.last().is_some_and(|p| p == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Url {
        Url::parse("https://sso.example.edu/cas").unwrap()
    }

    #[test]
    fn endpoints_are_resolved_below_the_server_path() {
        let login = login_url(
            &server(),
            "https://app.example.edu/accounts/login/?next=%2Fadmin%2F",
            false,
        );
        assert_eq!(login.path(), "/cas/login");
        let service: Vec<_> = login.query_pairs().collect();
        assert_eq!(service.len(), 1);
        assert_eq!(service[0].0, "service");
        assert_eq!(service[0].1, "https://app.example.edu/accounts/login/?next=%2Fadmin%2F");

        let with_slash = Url::parse("https://sso.example.edu/cas/").unwrap();
        assert_eq!(login_url(&with_slash, "s", true).path(), "/cas/login");
        assert!(login_url(&with_slash, "s", true).query().unwrap().contains("renew=true"));
    }

    #[test]
    fn validation_url_per_version() {
        let v1 = validation_url(&server(), CasVersion::V1, "ST-1", "svc", false);
        assert_eq!(v1.path(), "/cas/validate");
        let v2 = validation_url(&server(), CasVersion::V2, "ST-1", "svc", false);
        assert_eq!(v2.path(), "/cas/serviceValidate");
        let v3 = validation_url(&server(), CasVersion::V3, "ST-1", "svc", false);
        assert_eq!(v3.path(), "/cas/p3/serviceValidate");
        assert_eq!(v3.query(), Some("ticket=ST-1&service=svc"));
    }

    #[test]
    fn logout_url_uses_version_specific_parameter() {
        let v2 = logout_url(&server(), CasVersion::V2, Some("https://app/"));
        assert_eq!(v2.query(), Some("url=https%3A%2F%2Fapp%2F"));
        let v3 = logout_url(&server(), CasVersion::V3, Some("https://app/"));
        assert_eq!(v3.query(), Some("service=https%3A%2F%2Fapp%2F"));
        assert_eq!(logout_url(&server(), CasVersion::V2, None).query(), None);
    }

    #[test]
    fn v1_yes_and_no() {
        let id = parse_v1_response("yes\nalice\n").unwrap();
        assert_eq!(id.username.as_str(), "alice");
        assert!(matches!(parse_v1_response("no\n\n"), Err(CasError::TicketInvalid(_))));
        assert!(matches!(parse_v1_response("<html>"), Err(CasError::MalformedResponse(_))));
        assert!(matches!(parse_v1_response("yes\n\n"), Err(CasError::MalformedResponse(_))));
    }

    #[test]
    fn v2_success_with_pgt() {
        let xml = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationSuccess>
        <cas:user>alice</cas:user>
        <cas:proxyGrantingTicket>PGTIOU-84678-8a9d</cas:proxyGrantingTicket>
    </cas:authenticationSuccess>
</cas:serviceResponse>"#;

        let id = parse_service_response(xml).unwrap();
        assert_eq!(id.username.as_str(), "alice");
        assert_eq!(id.proxy_granting_ticket.as_deref(), Some("PGTIOU-84678-8a9d"));
        assert!(id.attributes.is_empty());
    }

    #[test]
    fn v3_success_collects_attributes() {
        let xml = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationSuccess>
        <cas:user>bob</cas:user>
        <cas:attributes>
            <cas:email>bob@example.edu</cas:email>
            <cas:memberOf>staff</cas:memberOf>
            <cas:memberOf>faculty</cas:memberOf>
            <cas:displayName>Bob &amp; Co</cas:displayName>
            <cas:nickname/>
        </cas:attributes>
    </cas:authenticationSuccess>
</cas:serviceResponse>"#;

        let id = parse_service_response(xml).unwrap();
        assert_eq!(id.username.as_str(), "bob");
        assert_eq!(id.attributes["email"], vec!["bob@example.edu".to_string()]);
        assert_eq!(id.attributes["memberOf"].len(), 2);
        assert_eq!(id.attributes["displayName"], vec!["Bob & Co".to_string()]);
        assert_eq!(id.attributes["nickname"], vec![String::new()]);
    }

    #[test]
    fn failures_are_classified() {
        let invalid = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationFailure code="INVALID_TICKET">Ticket ST-1 not recognized</cas:authenticationFailure>
</cas:serviceResponse>"#;
        assert!(matches!(parse_service_response(invalid), Err(CasError::TicketInvalid(_))));

        let expired = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationFailure code="INVALID_TICKET">Ticket ST-1 has expired</cas:authenticationFailure>
</cas:serviceResponse>"#;
        assert!(matches!(parse_service_response(expired), Err(CasError::TicketExpired(_))));

        let service = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationFailure code="INVALID_SERVICE">wrong service</cas:authenticationFailure>
</cas:serviceResponse>"#;
        assert!(matches!(parse_service_response(service), Err(CasError::ServiceMismatch(_))));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_service_response("<html><body>maintenance</body></html>"),
            Err(CasError::MalformedResponse(_))
        ));
        let no_user = r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationSuccess></cas:authenticationSuccess>
</cas:serviceResponse>"#;
        assert!(matches!(parse_service_response(no_user), Err(CasError::MalformedResponse(_))));
    }

    #[test]
    fn version_parsing() {
        assert_eq!("1".parse::<CasVersion>().unwrap(), CasVersion::V1);
        assert_eq!("2.0".parse::<CasVersion>().unwrap(), CasVersion::V2);
        assert_eq!(" 3 ".parse::<CasVersion>().unwrap(), CasVersion::V3);
        assert!("4".parse::<CasVersion>().is_err());
    }
}
