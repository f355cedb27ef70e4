//! Parse single-logout pushes (`logoutRequest` form field) sent by the CAS server.

use base64::{Engine, engine::general_purpose::STANDARD};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use casguard_core::{CasError, CasResult};

use crate::ServiceTicket;

/// Largest payload accepted before decoding.
pub const MAX_LOGOUT_REQUEST_LEN: usize = 64 * 1024;

/// Parsed SAML `LogoutRequest`.
///
/// CAS puts the service ticket that created the session in `SessionIndex`;
/// `NameID` is frequently the literal `@NOT_USED@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    pub id: String,
    pub name_id: Option<String>,
    pub session_index: ServiceTicket,
}

impl LogoutRequest {
    /// Parse the raw form value: plain XML or base64-encoded XML.
    pub fn parse(payload: &str) -> CasResult<Self> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(CasError::InvalidLogoutRequest("empty payload".to_string()));
        }
        if payload.len() > MAX_LOGOUT_REQUEST_LEN {
            return Err(CasError::InvalidLogoutRequest(
                "LogoutRequest too large".to_string(),
            ));
        }

        if payload.starts_with('<') {
            return parse_logout_request_xml(payload);
        }

        let decoded = STANDARD
            .decode(payload)
            .map_err(|e| CasError::InvalidLogoutRequest(format!("base64 decode failed: {e}")))?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| CasError::InvalidLogoutRequest(format!("invalid UTF-8: {e}")))?;
        parse_logout_request_xml(&xml)
    }
}

/// Parse a `LogoutRequest` document.
pub fn parse_logout_request_xml(xml: &str) -> CasResult<LogoutRequest> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_root = false;
    let mut id = None;
    let mut name_id = None;
    let mut session_index = None;
    let mut current_element = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                if local == "LogoutRequest" {
                    saw_root = true;
                    id = request_id(e).or(id);
                }
                current_element = local;
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing elements carry no text.
                if e.local_name().into_inner() == b"LogoutRequest" {
                    saw_root = true;
                    id = request_id(e).or(id);
                }
                current_element.clear();
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| CasError::InvalidLogoutRequest(format!("XML text error: {e}")))?
                    .trim()
                    .to_string();
                match current_element.as_str() {
                    "NameID" => name_id = Some(text),
                    "SessionIndex" => session_index = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current_element.clear(),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CasError::InvalidLogoutRequest(format!("XML parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(CasError::InvalidLogoutRequest(
            "missing LogoutRequest element".to_string(),
        ));
    }

    let id = id.unwrap_or_default();
    if id.len() > 256 {
        return Err(CasError::InvalidLogoutRequest("ID too long (max 256)".to_string()));
    }

    let session_index = session_index
        .ok_or_else(|| CasError::InvalidLogoutRequest("missing SessionIndex".to_string()))?;
    let session_index = ServiceTicket::parse(&session_index)
        .map_err(|e| CasError::InvalidLogoutRequest(format!("bad SessionIndex: {e}")))?;

    Ok(LogoutRequest {
        id,
        name_id,
        session_index,
    })
}

fn request_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().into_inner() == b"ID")
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}
