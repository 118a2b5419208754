//! Input types for endpoint methods that take more than a name.
//!
//! Responses stay as `serde_json` values: the API's resource shapes are open
//! ended and the client passes them through unchanged.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OpsBeaconError, Result};

/// A JSON object, as sent and returned by most endpoints.
pub type JsonObject = Map<String, Value>;

/// What `run` should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    /// A full command line such as `"myserver: check-disk"`.
    CommandLine(String),
    /// A named command on a named connection.
    Structured {
        connection: String,
        command: String,
        args: Vec<String>,
    },
}

impl RunRequest {
    pub fn command_line(text: impl Into<String>) -> Self {
        RunRequest::CommandLine(text.into())
    }

    pub fn structured(connection: impl Into<String>, command: impl Into<String>) -> Self {
        RunRequest::Structured {
            connection: connection.into(),
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let RunRequest::Structured { args, .. } = &mut self {
            *args = new_args.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Split `raw` the way a POSIX shell would and use the words as arguments.
    pub fn with_args_str(self, raw: &str) -> Result<Self> {
        let words = shell_words::split(raw).map_err(|e| {
            OpsBeaconError::validation(format!("invalid arguments: {e}"), Some("args"))
        })?;
        Ok(self.with_args(words))
    }

    pub fn command(&self) -> &str {
        match self {
            RunRequest::CommandLine(text) => text,
            RunRequest::Structured { command, .. } => command,
        }
    }

    pub fn connection(&self) -> Option<&str> {
        match self {
            RunRequest::CommandLine(_) => None,
            RunRequest::Structured { connection, .. } => Some(connection),
        }
    }
}

/// Source of a file upload.
#[derive(Debug, Clone)]
pub enum FileUpload {
    /// In-memory content stored under `file_name`.
    Content { file_name: String, content: Vec<u8> },
    /// A local file, stored under `file_name` or its own name.
    Path {
        path: PathBuf,
        file_name: Option<String>,
    },
}

impl FileUpload {
    pub fn content(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        FileUpload::Content {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        FileUpload::Path {
            path: path.into(),
            file_name: None,
        }
    }
}

/// Settings for a new MCP trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMcpTrigger {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tool_instances: Vec<Value>,
    #[serde(default)]
    pub policies: Vec<String>,
}

impl NewMcpTrigger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Fields to change on an existing MCP trigger; `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpTriggerUpdate {
    pub description: Option<String>,
    pub tool_instances: Option<Vec<Value>>,
}

/// A tool to expose through an MCP trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Name visible to the model. Defaults to `tool_{n}`.
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub command: String,
    /// Per-argument overrides, passed through as `argumentOverrides`.
    #[serde(default)]
    pub arguments: JsonObject,
}

/// Settings for a new execution policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPolicy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub connections: Vec<String>,
}

impl NewPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Outcome of `probe_mcp_server`. Each step holds the JSON-RPC response, or
/// `{"error": ...}` when that step failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpProbeReport {
    pub initialize: Option<Value>,
    pub tools: Option<Value>,
    pub execution: Option<Value>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_string_is_shell_split() {
        let request = RunRequest::structured("web-1", "tail-log")
            .with_args_str(r#"--lines 50 "/var/log/app log.txt""#)
            .unwrap();
        match request {
            RunRequest::Structured { args, .. } => {
                assert_eq!(args, vec!["--lines", "50", "/var/log/app log.txt"]);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let err = RunRequest::structured("c", "x")
            .with_args_str("\"unterminated")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn args_are_ignored_for_command_lines() {
        let request = RunRequest::command_line("web-1: uptime").with_args(["-x"]);
        assert_eq!(request, RunRequest::CommandLine("web-1: uptime".to_string()));
        assert_eq!(request.command(), "web-1: uptime");
        assert_eq!(request.connection(), None);
    }

    #[test]
    fn new_policy_defaults_to_empty_lists() {
        let policy: NewPolicy = serde_json::from_str(r#"{"name":"ops"}"#).unwrap();
        assert_eq!(policy.name, "ops");
        assert!(policy.commands.is_empty());
        assert!(policy.connections.is_empty());
    }
}
