//! The seam between the executor and the network.
//!
//! A `Transport` moves one `HttpRequest` over the wire and hands back the
//! `HttpResponse` exactly as received. Non-2xx statuses are data, not errors;
//! only failures to complete the exchange are reported as `TransportError`.

use std::io;

use tracing::trace;
use ureq::Agent;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Largest response body the default transport will buffer.
const MAX_BODY_BYTES: u64 = 1 << 30;

/// Failure to complete an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

/// Executes a single HTTP exchange.
///
/// Implementations must make exactly one attempt per call.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a pooled `ureq::Agent`.
///
/// The agent keeps idle connections alive between calls; dropping the
/// transport closes them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
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

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let timeout = Some(request.timeout);
        trace!(method = %request.method, url, "dispatching request");

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers)
                .config()
                .timeout_global(timeout)
                .build()
                .call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers)
                .config()
                .timeout_global(timeout)
                .build()
                .call(),
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(url), &request.headers)
                    .config()
                    .timeout_global(timeout)
                    .build();
                match &request.body {
                    Some(body) => builder.send(&body[..]),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(self.agent.put(url), &request.headers)
                    .config()
                    .timeout_global(timeout)
                    .build();
                match &request.body {
                    Some(body) => builder.send(&body[..]),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(classify)?;
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
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
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

fn classify(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) if is_timeout(&e) => TransportError::Timeout,
        ureq::Error::Io(e) => TransportError::Connect(e.to_string()),
        e @ (ureq::Error::HostNotFound | ureq::Error::ConnectionFailed) => {
            TransportError::Connect(e.to_string())
        }
        ureq::Error::Tls(msg) => TransportError::Connect(format!("tls: {msg}")),
        ureq::Error::ConnectProxyFailed(msg) => TransportError::Connect(msg),
        other => TransportError::Other(other.to_string()),
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
