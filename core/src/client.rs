//! The public client and its lifecycle.
//!
//! # Design
//! `OpsBeaconClient` owns one `Executor`, which owns the transport and its
//! connection pool. Endpoint methods live in `crate::api`, one module per
//! resource group. Each one validates its input, describes a single
//! `ApiCall`, and reshapes the decoded JSON.
//!
//! Dropping the client releases the transport exactly once, whether the
//! caller finishes normally, returns early with `?`, or unwinds. `close`
//! does the same thing explicitly.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{OpsBeaconError, Result};
use crate::executor::{ApiCall, Executor};
use crate::http::HttpResponse;
use crate::transport::{Transport, UreqTransport};
use crate::types::JsonObject;

/// Synchronous client for the OpsBeacon API.
///
/// ```no_run
/// use opsbeacon::{ClientConfig, OpsBeaconClient};
///
/// # fn main() -> opsbeacon::Result<()> {
/// let client = OpsBeaconClient::new(ClientConfig::new(
///     "api.console.opsbeacon.com",
///     "your-api-token",
/// ))?;
/// for command in client.commands()? {
///     println!("{}", command["name"]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct OpsBeaconClient<T: Transport = UreqTransport> {
    executor: Executor<T>,
    api_domain: String,
}

impl OpsBeaconClient<UreqTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Build a client from `OPSBEACON_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> OpsBeaconClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let executor = Executor::new(&config, transport);
        if config.debug {
            debug!(base_url = executor.base_url(), timeout = ?config.timeout, "client created");
        }
        Ok(Self {
            api_domain: config.normalized_domain().to_string(),
            executor,
        })
    }

    pub fn api_domain(&self) -> &str {
        &self.api_domain
    }

    pub fn base_url(&self) -> &str {
        self.executor.base_url()
    }

    pub fn timeout(&self) -> Duration {
        self.executor.timeout()
    }

    pub fn debug(&self) -> bool {
        self.executor.debug()
    }

    /// Send an arbitrary call through the executor and decode the JSON body.
    pub fn call(&self, call: ApiCall) -> Result<Value> {
        self.executor.json(call)
    }

    /// Send an arbitrary call and return the raw 2xx response.
    pub fn call_raw(&self, call: ApiCall) -> Result<HttpResponse> {
        self.executor.execute(call)
    }

    /// Release the underlying connection pool.
    pub fn close(self) {
        if self.debug() {
            debug!(base_url = self.base_url(), "client closed");
        }
    }

    pub(crate) fn executor(&self) -> &Executor<T> {
        &self.executor
    }
}

/// Reject blank identifiers before anything is sent.
pub(crate) fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OpsBeaconError::required(field));
    }
    Ok(())
}

/// Reject an empty object, or one without a non-empty string `key`.
pub(crate) fn require_object_field(object: &JsonObject, what: &str, key: &str) -> Result<()> {
    if object.is_empty() {
        let mut label = what.to_string();
        if let Some(first) = label.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        return Err(OpsBeaconError::validation(format!("{label} data is required"), Some(what)));
    }
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        _ => Err(OpsBeaconError::validation(format!("{what}.{key} is required"), Some(key))),
    }
}

/// The array under `field`, in server order. Missing or non-array is empty.
pub(crate) fn list_field(body: Value, field: &str) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Coerce a response body into an object. `null` becomes `{}`; any other
/// non-object is wrapped as `{"result": ...}`.
pub(crate) fn into_object(body: Value) -> JsonObject {
    match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// First item whose `name` equals `name`.
pub(crate) fn find_named(items: Vec<Value>, name: &str) -> Option<JsonObject> {
    items.into_iter().find_map(|item| match item {
        Value::Object(map) if map.get("name").and_then(Value::as_str) == Some(name) => Some(map),
        _ => None,
    })
}

/// A non-empty string under `key`.
pub(crate) fn str_field<'a>(object: &'a JsonObject, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
