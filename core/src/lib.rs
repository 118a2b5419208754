//! Synchronous client for the OpsBeacon operations-automation API.
//!
//! # Overview
//! `OpsBeaconClient` wraps the workspace REST API: commands, connections,
//! users and groups, file transfer, command execution, triggers (including
//! MCP triggers), policies and apps. Responses are returned as
//! `serde_json` values; failures are one `OpsBeaconError` enum.
//!
//! # Design
//! - Every endpoint method builds an `ApiCall` and hands it to the
//!   `Executor`, which authenticates it, sends it once through a
//!   `Transport`, and maps the status code to an error variant.
//! - The default transport is a pooled `ureq` agent. Tests swap in their
//!   own transport through `OpsBeaconClient::with_transport`.
//! - Configuration is explicit (`ClientConfig`); there is no global client.
//! - Nothing is retried. A rate limit is surfaced with its `Retry-After`.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod transport;
pub mod types;

pub use client::OpsBeaconClient;
pub use config::ClientConfig;
pub use error::{ErrorKind, OpsBeaconError, Result};
pub use executor::{ApiCall, Executor};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{
    FileUpload, JsonObject, McpProbeReport, McpTriggerUpdate, NewMcpTrigger, NewPolicy, RunRequest,
    ToolConfig,
};
