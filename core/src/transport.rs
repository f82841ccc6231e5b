//! Executing `HttpRequest`s.
//!
//! `Transport` is the seam between the deterministic request/response core
//! and the network. `UreqTransport` is the default blocking implementation;
//! tests plug in scripted transports instead.

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Performs one HTTP round-trip.
///
/// Implementations must return every HTTP status as data. `Err` is reserved
/// for requests that produced no response at all.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// The URL without its query string, which may hold the access token.
pub(crate) fn loggable_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(head, _)| head)
}

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "ureq")]
mod ureq_transport {
    use std::fmt;
    use std::time::Duration;

    use tracing::debug;

    use super::{loggable_url, Transport};
    use crate::error::TransportError;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    /// Blocking transport backed by a shared `ureq::Agent`.
    ///
    /// The agent is created once and reused, so connections are pooled
    /// across calls. ureq's status-code-as-error behavior is disabled.
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl fmt::Debug for UreqTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("UreqTransport").finish_non_exhaustive()
        }
    }

    impl UreqTransport {
        pub fn new() -> Self {
            Self::with_timeout(None)
        }

        /// `timeout` bounds the whole call, from connect to end of body.
        pub fn with_timeout(timeout: Option<Duration>) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    fn with_headers<B>(
        mut builder: ureq::RequestBuilder<B>,
        headers: &[(String, String)],
    ) -> ureq::RequestBuilder<B> {
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    impl Transport for UreqTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let target = format!("{method} {}", loggable_url(&url));

            let result = match (method, body) {
                (HttpMethod::Get, _) => with_headers(self.agent.get(&url), &headers).call(),
                (HttpMethod::Post, Some(body)) => {
                    with_headers(self.agent.post(&url), &headers).send(&body[..])
                }
                (HttpMethod::Post, None) => with_headers(self.agent.post(&url), &headers).send_empty(),
                (HttpMethod::Put, Some(body)) => {
                    with_headers(self.agent.put(&url), &headers).send(&body[..])
                }
                (HttpMethod::Put, None) => with_headers(self.agent.put(&url), &headers).send_empty(),
            };

            let mut response = result.map_err(|e| {
                debug!(%target, error = %e, "request failed");
                TransportError::with_source(target.clone(), e)
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .read_to_vec()
                .map_err(|e| TransportError::with_source(format!("{target}: reading body"), e))?;

            debug!(%target, status, bytes = body.len(), "response received");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}
