//! Back-channel service ticket validation.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use casguard_core::{CasError, CasResult};

use crate::protocol::{self, CasVersion};
use crate::{AuthenticatedIdentity, ServiceTicket};

/// Exchanges a service ticket for a verified identity.
///
/// A ticket is consumed by the CAS server on the first attempt, so
/// implementations must not retry on their own.
#[async_trait]
pub trait TicketValidator: Send + Sync {
    async fn validate(
        &self,
        ticket: &ServiceTicket,
        service: &str,
    ) -> CasResult<AuthenticatedIdentity>;
}

/// Validates tickets over HTTP(S) against a CAS server.
#[derive(Debug, Clone)]
pub struct HttpTicketValidator {
    client: reqwest::Client,
    server: Url,
    version: CasVersion,
    renew: bool,
}

impl HttpTicketValidator {
    /// Build a validator whose requests give up after `timeout`.
    pub fn new(server: Url, version: CasVersion, timeout: Duration) -> CasResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // The validation endpoint answers directly. A redirect means the
            // server URL is misconfigured.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CasError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            server,
            version,
            renew: false,
        })
    }

    pub fn with_renew(mut self, renew: bool) -> Self {
        self.renew = renew;
        self
    }

    pub fn version(&self) -> CasVersion {
        self.version
    }
}

#[async_trait]
impl TicketValidator for HttpTicketValidator {
    async fn validate(
        &self,
        ticket: &ServiceTicket,
        service: &str,
    ) -> CasResult<AuthenticatedIdentity> {
        let url = protocol::validation_url(
            &self.server,
            self.version,
            ticket.as_str(),
            service,
            self.renew,
        );

        tracing::debug!(
            version = ?self.version,
            endpoint = %url.path(),
            "validating service ticket"
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CasError::network("timed out waiting for CAS server")
            } else {
                CasError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CasError::network(format!(
                "CAS server answered HTTP {status}"
            )));
        }

        let body = read_capped(response).await?;

        let identity = protocol::parse_validation_response(self.version, &body)?;
        tracing::info!(username = %identity.username, "service ticket validated");
        Ok(identity)
    }
}

/// Read the body, giving up as soon as it exceeds [`protocol::MAX_RESPONSE_LEN`].
async fn read_capped(mut response: reqwest::Response) -> CasResult<String> {
    let too_large = || CasError::malformed("validation response too large");

    if response
        .content_length()
        .is_some_and(|len| len > protocol::MAX_RESPONSE_LEN as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CasError::network(format!("failed to read CAS response: {e}")))?
    {
        if body.len() + chunk.len() > protocol::MAX_RESPONSE_LEN {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body).map_err(|_| CasError::malformed("validation response is not UTF-8"))
}
