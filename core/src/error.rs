//! Error types for the OpsBeacon client.
//!
//! # Design
//! Every failure surfaces as one `OpsBeaconError` variant, so callers match on
//! the kind instead of parsing messages. Each kind is produced at exactly one
//! layer:
//! - `Validation` before any request is dispatched,
//! - `Connection` / `Timeout` from the transport call,
//! - `Authentication` / `ResourceNotFound` / `RateLimit` / `Api` from status
//!   inspection in the executor,
//! - `CommandExecution` / `FileOperation` / `Mcp` from endpoint methods that
//!   inspect a successful payload.
//!
//! None of the variants ever carries the API token.

use std::time::Duration;

/// Maximum number of characters of a response body kept on `Api` errors.
pub const BODY_EXCERPT_LEN: usize = 500;

/// Errors returned by every `OpsBeaconClient` operation.
#[derive(Debug, thiserror::Error)]
pub enum OpsBeaconError {
    /// The server returned 401 or 403.
    #[error("{message}")]
    Authentication { message: String },

    /// Caller input was rejected before a request was sent.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The server returned 404, or a named item was absent from a listing.
    #[error("{resource_type} '{resource_id}' not found")]
    ResourceNotFound {
        resource_type: String,
        resource_id: String,
    },

    /// The server returned 429.
    #[error("Rate limit exceeded. Please retry later.")]
    RateLimit { retry_after: Option<u64> },

    /// Any other unsuccessful response.
    #[error("{message}{}", .status.map(|s| format!(" (status: {s})")).unwrap_or_default())]
    Api {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// DNS, refused connection, TLS or socket failure.
    #[error("{message}")]
    Connection { message: String },

    /// The request did not complete within its deadline.
    #[error("Request timed out after {:.1}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    /// The execution endpoint reported a failed command.
    #[error("{message}")]
    CommandExecution {
        message: String,
        command: Option<String>,
        connection: Option<String>,
        output: Option<String>,
        exit_code: Option<i64>,
    },

    /// Upload or download failed, locally or remotely.
    #[error("{message}")]
    FileOperation {
        message: String,
        file_name: Option<String>,
        operation: Option<String>,
    },

    /// A trigger/MCP endpoint reported a logical failure.
    #[error("{message}")]
    Mcp {
        message: String,
        trigger_name: Option<String>,
    },
}

/// Discriminant of an `OpsBeaconError`, for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Validation,
    ResourceNotFound,
    RateLimit,
    Api,
    Connection,
    Timeout,
    CommandExecution,
    FileOperation,
    Mcp,
}

pub type Result<T> = std::result::Result<T, OpsBeaconError>;

impl OpsBeaconError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        OpsBeaconError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Shorthand for the common "`{field} is required`" validation failure.
    pub fn required(field: &str) -> Self {
        Self::validation(format!("{field} is required"), Some(field))
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        OpsBeaconError::ResourceNotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsBeaconError::Authentication { .. } => ErrorKind::Authentication,
            OpsBeaconError::Validation { .. } => ErrorKind::Validation,
            OpsBeaconError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            OpsBeaconError::RateLimit { .. } => ErrorKind::RateLimit,
            OpsBeaconError::Api { .. } => ErrorKind::Api,
            OpsBeaconError::Connection { .. } => ErrorKind::Connection,
            OpsBeaconError::Timeout { .. } => ErrorKind::Timeout,
            OpsBeaconError::CommandExecution { .. } => ErrorKind::CommandExecution,
            OpsBeaconError::FileOperation { .. } => ErrorKind::FileOperation,
            OpsBeaconError::Mcp { .. } => ErrorKind::Mcp,
        }
    }

    /// HTTP status associated with the error, when one is known.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OpsBeaconError::ResourceNotFound { .. } => Some(404),
            OpsBeaconError::RateLimit { .. } => Some(429),
            OpsBeaconError::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Seconds the server asked us to wait, for `RateLimit` errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            OpsBeaconError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Human-readable message without the structured context.
    pub fn message(&self) -> String {
        match self {
            OpsBeaconError::Authentication { message }
            | OpsBeaconError::Validation { message, .. }
            | OpsBeaconError::Api { message, .. }
            | OpsBeaconError::Connection { message }
            | OpsBeaconError::CommandExecution { message, .. }
            | OpsBeaconError::FileOperation { message, .. }
            | OpsBeaconError::Mcp { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Truncate a response body to at most `BODY_EXCERPT_LEN` characters.
pub(crate) fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
