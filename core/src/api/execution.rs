//! Command execution through the trigger API.

use serde_json::{json, Value};

use super::EXECUTE;
use crate::client::{into_object, str_field, OpsBeaconClient};
use crate::error::{OpsBeaconError, Result};
use crate::executor::ApiCall;
use crate::transport::Transport;
use crate::types::{JsonObject, RunRequest};

impl<T: Transport> OpsBeaconClient<T> {
    /// Execute a command and return the API's result object.
    ///
    /// A 200 response whose payload reports a failed command is returned as
    /// `OpsBeaconError::CommandExecution`.
    pub fn run(&self, request: RunRequest) -> Result<JsonObject> {
        let body = match &request {
            RunRequest::CommandLine(text) if !text.trim().is_empty() => {
                json!({ "commandLine": text })
            }
            RunRequest::Structured {
                connection,
                command,
                args,
            } if !connection.trim().is_empty() && !command.trim().is_empty() => json!({
                "command": command,
                "connection": connection,
                "arguments": args,
            }),
            _ => {
                return Err(OpsBeaconError::validation(
                    "Either command_text or both connection and command are required",
                    None,
                ))
            }
        };

        let result = into_object(self.executor().json(ApiCall::post(EXECUTE).json(body))?);
        if let Some(message) = failure_message(&result) {
            return Err(OpsBeaconError::CommandExecution {
                message,
                command: Some(request.command().to_string()),
                connection: request.connection().map(str::to_string),
                output: str_field(&result, "output").map(str::to_string),
                exit_code: exit_code(&result),
            });
        }
        Ok(result)
    }
}

fn exit_code(payload: &JsonObject) -> Option<i64> {
    payload
        .get("exitCode")
        .or_else(|| payload.get("exit_code"))
        .and_then(Value::as_i64)
}

/// `Some(reason)` when a 200 payload describes a failed execution.
fn failure_message(payload: &JsonObject) -> Option<String> {
    let flagged = payload.get("success") == Some(&Value::Bool(false));
    // Intermediate or unknown statuses ("completed", "running") are not failures.
    let bad_status = payload
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| {
            matches!(status.to_ascii_lowercase().as_str(), "failed" | "failure" | "error")
        });
    let bad_exit = exit_code(payload).is_some_and(|code| code != 0);
    let has_err = str_field(payload, "err").is_some();
    if !(flagged || bad_status || bad_exit || has_err) {
        return None;
    }
    let reason = ["error", "err", "output"]
        .into_iter()
        .find_map(|key| str_field(payload, key))
        .unwrap_or("Command execution failed");
    Some(reason.to_string())
}
