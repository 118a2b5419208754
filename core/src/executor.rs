//! The single choke point every API call goes through.
//!
//! # Design
//! Endpoint methods describe a call as an `ApiCall` (verb, path, query, body,
//! optional timeout and the resource it targets). `Executor::execute` turns
//! it into an authenticated `HttpRequest`, hands it to the transport once,
//! and classifies the outcome:
//!
//! | outcome                  | error                          |
//! |--------------------------|--------------------------------|
//! | 401 / 403                | `Authentication`               |
//! | 404                      | `ResourceNotFound`             |
//! | 429                      | `RateLimit`                    |
//! | other non-2xx            | `Api`                          |
//! | transport timeout        | `Timeout`                      |
//! | DNS / refused / TLS / IO | `Connection`                   |
//!
//! There is no retry at this layer or any other.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::error::{excerpt, OpsBeaconError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};

pub const USER_AGENT: &str = concat!("OpsBeacon-Rust-SDK/", env!("CARGO_PKG_VERSION"));

/// Request payload.
#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    /// An already encoded body sent with its own `Content-Type`, such as a
    /// multipart form.
    Encoded { content_type: String, bytes: Vec<u8> },
}

/// Description of one API call, built by an endpoint method and consumed by
/// `Executor::execute`.
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: HttpMethod,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Option<Duration>,
    resource: Option<(String, String)>,
}

impl ApiCall {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            resource: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn encoded(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.body = Some(Body::Encoded {
            content_type: content_type.into(),
            bytes,
        });
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Override the client-wide timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name the resource a 404 should be reported against.
    pub fn resource(mut self, resource_type: &str, resource_id: &str) -> Self {
        self.resource = Some((resource_type.to_string(), resource_id.to_string()));
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Performs authenticated calls against one API domain.
pub struct Executor<T> {
    transport: T,
    base_url: String,
    api_token: String,
    timeout: Duration,
    debug: bool,
}

impl<T: Transport> Executor<T> {
    pub fn new(config: &ClientConfig, transport: T) -> Self {
        Self {
            transport,
            base_url: config.base_url(),
            api_token: config.api_token.clone(),
            timeout: config.timeout,
            debug: config.debug,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Send `call` once and return the 2xx response, or the classified error.
    pub fn execute(&self, call: ApiCall) -> Result<HttpResponse> {
        let url = self.resolve(&call.path, &call.query);
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", self.api_token)),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let body = match call.body {
            None => None,
            Some(Body::Json(value)) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                let bytes = serde_json::to_vec(&value).map_err(|e| {
                    OpsBeaconError::validation(format!("request body is not serializable: {e}"), None)
                })?;
                Some(bytes)
            }
            Some(Body::Encoded { content_type, bytes }) => {
                headers.push(("Content-Type".to_string(), content_type));
                Some(bytes)
            }
        };
        let request = HttpRequest {
            method: call.method,
            url,
            headers,
            body,
            timeout: call.timeout.unwrap_or(self.timeout),
        };

        let response = self.send(&request)?;
        let (resource_type, resource_id) = call
            .resource
            .unwrap_or_else(|| ("Resource".to_string(), call.path.clone()));
        check_status(&response, &resource_type, &resource_id)?;
        Ok(response)
    }

    /// Like `execute`, but decode the body as JSON. An empty body is `Null`.
    pub fn json(&self, call: ApiCall) -> Result<Value> {
        let response = self.execute(call)?;
        decode_json(&response)
    }

    /// Send a request to an absolute URL outside the API, without the
    /// workspace token. Transport failures are classified as in `execute`;
    /// the status is left for the caller to judge.
    pub fn external(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<HttpResponse> {
        let mut headers = vec![("User-Agent".to_string(), USER_AGENT.to_string())];
        if let Some(token) = bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        let body = match body {
            Some(value) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(value.to_string().into_bytes())
            }
            None => None,
        };
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
            timeout: self.timeout,
        };
        self.send(&request)
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if self.debug {
            debug!(?request, "HTTP request");
        }
        let started = Instant::now();
        let response = self.transport.execute(request).map_err(|err| match err {
            TransportError::Timeout => {
                error!(method = %request.method, url = %request.url, timeout = ?request.timeout, "request timed out");
                OpsBeaconError::Timeout {
                    timeout: request.timeout,
                }
            }
            TransportError::Connect(reason) => {
                error!(method = %request.method, url = %request.url, %reason, "connection error");
                OpsBeaconError::Connection {
                    message: format!("Failed to connect to {}", request.url),
                }
            }
            TransportError::Other(reason) => {
                error!(method = %request.method, url = %request.url, %reason, "request error");
                OpsBeaconError::Api {
                    message: format!("Request failed: {reason}"),
                    status: None,
                    body: None,
                }
            }
        })?;
        if self.debug {
            debug!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                bytes = response.body.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "HTTP response"
            );
        }
        Ok(response)
    }

    fn resolve(&self, path: &str, query: &[(String, String)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        for (i, (key, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}

/// Percent-encode an identifier for use as one path segment.
pub fn segment(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

/// Map non-success status codes to the matching `OpsBeaconError` variant.
pub fn check_status(response: &HttpResponse, resource_type: &str, resource_id: &str) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        401 => Err(OpsBeaconError::Authentication {
            message: "Authentication failed. Check your API token.".to_string(),
        }),
        403 => Err(OpsBeaconError::Authentication {
            message: "Access forbidden. Check your API token permissions.".to_string(),
        }),
        404 => Err(OpsBeaconError::not_found(resource_type, resource_id)),
        429 => Err(OpsBeaconError::RateLimit {
            retry_after: response
                .header("Retry-After")
                .and_then(|v| v.trim().parse::<u64>().ok()),
        }),
        status => {
            let text = response.text();
            Err(OpsBeaconError::Api {
                message: format!("API error: {}", error_message(&text, status)),
                status: Some(status),
                body: Some(excerpt(&text)),
            })
        }
    }
}

/// Decode a response body as JSON.
pub fn decode_json(response: &HttpResponse) -> Result<Value> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| OpsBeaconError::Api {
        message: format!("Invalid JSON in response: {e}"),
        status: Some(response.status),
        body: Some(excerpt(&response.text())),
    })
}

// The API reports failures as `{"err": ...}`, older endpoints as `{"error": ...}`.
fn error_message(text: &str, status: u16) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        for key in ["err", "error"] {
            match map.get(key) {
                Some(Value::String(s)) => return s.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    if text.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        excerpt(text.trim())
    }
}
