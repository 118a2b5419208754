//! Triggers, with helpers for the MCP trigger kind.
//!
//! An MCP trigger exposes a set of tool instances to AI clients. Each tool
//! instance names the command and connection it runs through `overrides`;
//! the trigger's own `commands`/`connections` lists are derived from those.

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::TRIGGERS;
use crate::client::{find_named, into_object, list_field, require, str_field, OpsBeaconClient};
use crate::error::{OpsBeaconError, Result};
use crate::executor::{segment, ApiCall};
use crate::transport::Transport;
use crate::types::{JsonObject, McpTriggerUpdate, NewMcpTrigger, ToolConfig};

const MCP_KIND: &str = "mcp";

impl<T: Transport> OpsBeaconClient<T> {
    /// Triggers in the workspace, optionally only those of `kind`
    /// (`mcp`, `webHook`, `cron`, `link`).
    pub fn triggers(&self, kind: Option<&str>) -> Result<Vec<Value>> {
        let all = list_field(self.executor().json(ApiCall::get(TRIGGERS))?, "triggers");
        Ok(match kind {
            Some(kind) => all
                .into_iter()
                .filter(|t| t.get("kind").and_then(Value::as_str) == Some(kind))
                .collect(),
            None => all,
        })
    }

    pub fn mcp_triggers(&self) -> Result<Vec<Value>> {
        self.triggers(Some(MCP_KIND))
    }

    /// Fetch one trigger. Falls back to searching the full listing when the
    /// direct lookup is unavailable.
    pub fn get_trigger(&self, name: &str) -> Result<JsonObject> {
        require(name, "name")?;
        let call = ApiCall::get(format!("{TRIGGERS}/{}", segment(name))).resource("Trigger", name);
        match self.executor().json(call) {
            Ok(body) => Ok(into_object(body)),
            Err(err @ (OpsBeaconError::ResourceNotFound { .. } | OpsBeaconError::Api { .. })) => {
                debug!(trigger = name, error = %err, "direct trigger lookup failed, searching list");
                find_named(self.triggers(None)?, name)
                    .ok_or_else(|| OpsBeaconError::not_found("Trigger", name))
            }
            Err(other) => Err(other),
        }
    }

    /// Create an MCP trigger.
    ///
    /// The returned `apiToken` is only ever shown once, on creation.
    pub fn create_mcp_trigger(&self, trigger: NewMcpTrigger) -> Result<JsonObject> {
        require(&trigger.name, "name")?;
        let (commands, connections) = tool_targets(&trigger.tool_instances);
        let payload = json!({
            "name": trigger.name,
            "description": trigger.description,
            "kind": MCP_KIND,
            "commands": commands,
            "connections": connections,
            "policies": trigger.policies,
            "mcpTriggerInfo": { "toolInstances": trigger.tool_instances },
        });

        let result = into_object(self.executor().json(ApiCall::post(TRIGGERS).json(payload))?);
        if let Some(url) = result.get("url").filter(|u| !u.is_null()) {
            let mut created = JsonObject::new();
            created.insert("success".to_string(), Value::Bool(true));
            created.insert("name".to_string(), Value::String(trigger.name.clone()));
            created.insert("url".to_string(), url.clone());
            created.insert(
                "apiToken".to_string(),
                result.get("apiToken").cloned().unwrap_or(Value::Null),
            );
            created.insert(
                "message".to_string(),
                Value::String(format!("MCP trigger '{}' created successfully", trigger.name)),
            );
            return Ok(created);
        }
        if let Some(err) = str_field(&result, "err") {
            return Err(mcp_error(err.to_string(), &trigger.name));
        }
        Ok(result)
    }

    /// Update the description and/or tool set of an MCP trigger.
    pub fn update_mcp_trigger(&self, name: &str, update: McpTriggerUpdate) -> Result<JsonObject> {
        require(name, "name")?;
        let existing = self.get_trigger(name)?;
        ensure_mcp(&existing, name)?;

        let (commands, connections) = match &update.tool_instances {
            Some(tools) => {
                let (commands, connections) = tool_targets(tools);
                (json!(commands), json!(connections))
            }
            None => (
                existing.get("commands").cloned().unwrap_or_else(|| json!([])),
                existing.get("connections").cloned().unwrap_or_else(|| json!([])),
            ),
        };
        let description = update
            .description
            .unwrap_or_else(|| str_field(&existing, "description").unwrap_or_default().to_string());
        let mut info = match existing.get("mcpTriggerInfo") {
            Some(Value::Object(info)) => info.clone(),
            _ => JsonObject::new(),
        };
        if let Some(tools) = update.tool_instances {
            info.insert("toolInstances".to_string(), Value::Array(tools));
        }

        let payload = json!({
            "name": name,
            "kind": MCP_KIND,
            "description": description,
            "commands": commands,
            "connections": connections,
            "mcpTriggerInfo": info,
        });
        let call = ApiCall::put(format!("{TRIGGERS}/{}", segment(name)))
            .json(payload)
            .resource("Trigger", name);
        let result = into_object(self.executor().json(call)?);
        if let Some(err) = str_field(&result, "err") {
            return Err(mcp_error(err.to_string(), name));
        }
        Ok(result)
    }

    pub fn delete_trigger(&self, name: &str) -> Result<bool> {
        require(name, "name")?;
        self.executor().execute(
            ApiCall::delete(format!("{TRIGGERS}/{}", segment(name))).resource("Trigger", name),
        )?;
        Ok(true)
    }

    /// The MCP server URL of a trigger, or `None` if there is no such MCP
    /// trigger.
    pub fn get_mcp_trigger_url(&self, name: &str) -> Result<Option<String>> {
        require(name, "name")?;
        match self.get_trigger(name) {
            Ok(trigger) if is_mcp(&trigger) => {
                Ok(str_field(&trigger, "triggerUrl").map(str::to_string))
            }
            Ok(_) | Err(OpsBeaconError::ResourceNotFound { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Append a tool to an MCP trigger and save it.
    pub fn add_tool_to_mcp_trigger(&self, trigger_name: &str, tool: ToolConfig) -> Result<JsonObject> {
        require(trigger_name, "trigger_name")?;
        if tool.command.trim().is_empty() {
            return Err(OpsBeaconError::validation(
                "tool_config.command is required",
                Some("tool_config"),
            ));
        }
        let trigger = self.get_trigger(trigger_name)?;
        ensure_mcp(&trigger, trigger_name)?;

        let mut tools = tool_instances(&trigger);
        let instance_id = Uuid::new_v4().to_string();
        let name = tool
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("tool_{}", tools.len() + 1));
        tools.push(json!({
            "instanceId": instance_id,
            "templateId": instance_id,
            "overrides": {
                "name": name,
                "description": tool.description,
                "connection": tool.connection,
                "command": tool.command,
                "argumentOverrides": tool.arguments,
            },
        }));

        self.update_mcp_trigger(
            trigger_name,
            McpTriggerUpdate {
                description: None,
                tool_instances: Some(tools),
            },
        )
    }

    /// Remove every tool named `tool_name` from an MCP trigger and save it.
    pub fn remove_tool_from_mcp_trigger(&self, trigger_name: &str, tool_name: &str) -> Result<JsonObject> {
        require(trigger_name, "trigger_name")?;
        require(tool_name, "tool_name")?;
        let trigger = self.get_trigger(trigger_name)?;
        ensure_mcp(&trigger, trigger_name)?;

        let tools = tool_instances(&trigger);
        let before = tools.len();
        let kept: Vec<Value> = tools
            .into_iter()
            .filter(|t| t.pointer("/overrides/name").and_then(Value::as_str) != Some(tool_name))
            .collect();
        if kept.len() == before {
            return Err(OpsBeaconError::not_found("Tool", tool_name));
        }

        self.update_mcp_trigger(
            trigger_name,
            McpTriggerUpdate {
                description: None,
                tool_instances: Some(kept),
            },
        )
    }
}

fn mcp_error(message: String, trigger_name: &str) -> OpsBeaconError {
    OpsBeaconError::Mcp {
        message,
        trigger_name: Some(trigger_name.to_string()),
    }
}

fn is_mcp(trigger: &JsonObject) -> bool {
    trigger.get("kind").and_then(Value::as_str) == Some(MCP_KIND)
}

fn ensure_mcp(trigger: &JsonObject, name: &str) -> Result<()> {
    if is_mcp(trigger) {
        Ok(())
    } else {
        Err(mcp_error(format!("'{name}' is not an MCP trigger"), name))
    }
}

fn tool_instances(trigger: &JsonObject) -> Vec<Value> {
    trigger
        .get("mcpTriggerInfo")
        .and_then(|info| info.get("toolInstances"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Distinct commands and connections referenced by tool overrides, in
/// first-seen order.
fn tool_targets(tools: &[Value]) -> (Vec<String>, Vec<String>) {
    let mut commands: Vec<String> = Vec::new();
    let mut connections: Vec<String> = Vec::new();
    for tool in tools {
        for (key, seen) in [("command", &mut commands), ("connection", &mut connections)] {
            let value = tool
                .get("overrides")
                .and_then(|o| o.get(key))
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                if !seen.iter().any(|s| s == value) {
                    seen.push(value.to_string());
                }
            }
        }
    }
    (commands, connections)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::tests::client;
    use crate::error::ErrorKind;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::transport::mock::MockTransport;

    fn mcp_trigger() -> Value {
        json!({
            "name": "ops-assistant",
            "kind": "mcp",
            "description": "Ops tools",
            "triggerUrl": "https://mcp.example.com/ops-assistant",
            "commands": ["check-disk"],
            "connections": ["web-1"],
            "mcpTriggerInfo": {
                "toolInstances": [
                    {"instanceId": "i-1", "overrides": {"name": "disk", "command": "check-disk", "connection": "web-1"}},
                ],
            },
        })
    }

    fn body_of(request: &crate::http::HttpRequest) -> Value {
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn triggers_filter_by_kind() {
        let transport = MockTransport::new();
        transport.reply_json(
            200,
            json!({"triggers": [
                {"name": "a", "kind": "mcp"},
                {"name": "b", "kind": "cron"},
                {"name": "c", "kind": "mcp"},
            ]}),
        );
        let triggers = client(&transport).mcp_triggers().unwrap();
        let names: Vec<&str> = triggers.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn get_trigger_direct_hit() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        let trigger = client(&transport).get_trigger("ops-assistant").unwrap();
        assert_eq!(trigger["kind"], "mcp");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn get_trigger_falls_back_to_listing() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(404, ""));
        transport.reply_json(200, json!({"triggers": [mcp_trigger()]}));
        let trigger = client(&transport).get_trigger("ops-assistant").unwrap();
        assert_eq!(trigger["name"], "ops-assistant");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn get_trigger_missing_everywhere_is_not_found() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(404, ""));
        transport.reply_json(200, json!({"triggers": []}));
        let err = client(&transport).get_trigger("nope").unwrap_err();
        assert_eq!(err.to_string(), "Trigger 'nope' not found");
    }

    #[test]
    fn get_trigger_auth_failure_does_not_fall_back() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(401, ""));
        let err = client(&transport).get_trigger("x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn create_mcp_trigger_builds_payload_and_summarizes() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"url": "https://mcp.example.com/t", "apiToken": "mcp-tok"}));
        let mut new_trigger = NewMcpTrigger::new("ops-assistant");
        new_trigger.description = "Ops tools".to_string();
        new_trigger.policies = vec!["read-only".to_string()];
        new_trigger.tool_instances = vec![
            json!({"overrides": {"command": "check-disk", "connection": "web-1"}}),
            json!({"overrides": {"command": "check-disk", "connection": "web-2"}}),
            json!({"overrides": {"command": "uptime", "connection": "web-1"}}),
        ];

        let created = client(&transport).create_mcp_trigger(new_trigger).unwrap();
        assert_eq!(created["success"], true);
        assert_eq!(created["apiToken"], "mcp-tok");
        assert_eq!(created["message"], "MCP trigger 'ops-assistant' created successfully");

        let sent = body_of(&transport.last_request());
        assert_eq!(sent["kind"], "mcp");
        assert_eq!(sent["commands"], json!(["check-disk", "uptime"]));
        assert_eq!(sent["connections"], json!(["web-1", "web-2"]));
        assert_eq!(sent["policies"], json!(["read-only"]));
        assert_eq!(sent["mcpTriggerInfo"]["toolInstances"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn create_mcp_trigger_err_payload_raises_mcp_error() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"err": "trigger already exists"}));
        let err = client(&transport)
            .create_mcp_trigger(NewMcpTrigger::new("dup"))
            .unwrap_err();
        match err {
            OpsBeaconError::Mcp { message, trigger_name } => {
                assert_eq!(message, "trigger already exists");
                assert_eq!(trigger_name.as_deref(), Some("dup"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn create_mcp_trigger_requires_name() {
        let transport = MockTransport::new();
        let err = client(&transport)
            .create_mcp_trigger(NewMcpTrigger::new(""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn update_keeps_existing_fields_when_unset() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, json!({"name": "ops-assistant"}));
        client(&transport)
            .update_mcp_trigger(
                "ops-assistant",
                McpTriggerUpdate {
                    description: Some("New description".to_string()),
                    tool_instances: None,
                },
            )
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.method, HttpMethod::Put);
        assert!(request.url.ends_with("/workspace/v2/triggers/ops-assistant"));
        let sent = body_of(&request);
        assert_eq!(sent["description"], "New description");
        assert_eq!(sent["commands"], json!(["check-disk"]));
        assert_eq!(sent["mcpTriggerInfo"]["toolInstances"][0]["instanceId"], "i-1");
    }

    #[test]
    fn update_rejects_non_mcp_trigger() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"name": "nightly", "kind": "cron"}));
        let err = client(&transport)
            .update_mcp_trigger("nightly", McpTriggerUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mcp);
        assert_eq!(err.to_string(), "'nightly' is not an MCP trigger");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn add_tool_appends_instance_with_fresh_id() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, json!({"name": "ops-assistant"}));
        let tool = ToolConfig {
            name: None,
            description: "Show uptime".to_string(),
            connection: "web-2".to_string(),
            command: "uptime".to_string(),
            arguments: JsonObject::new(),
        };
        client(&transport).add_tool_to_mcp_trigger("ops-assistant", tool).unwrap();

        let sent = body_of(&transport.last_request());
        let tools = sent["mcpTriggerInfo"]["toolInstances"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        let added = &tools[1];
        assert_eq!(added["overrides"]["name"], "tool_2");
        assert_eq!(added["instanceId"], added["templateId"]);
        assert!(Uuid::parse_str(added["instanceId"].as_str().unwrap()).is_ok());
        assert_eq!(sent["commands"], json!(["check-disk", "uptime"]));
        assert_eq!(sent["connections"], json!(["web-1", "web-2"]));
    }

    #[test]
    fn add_tool_requires_command() {
        let transport = MockTransport::new();
        let err = client(&transport)
            .add_tool_to_mcp_trigger("ops-assistant", ToolConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn remove_tool_drops_matching_instances() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, json!({"name": "ops-assistant"}));
        client(&transport)
            .remove_tool_from_mcp_trigger("ops-assistant", "disk")
            .unwrap();
        let sent = body_of(&transport.last_request());
        assert_eq!(sent["mcpTriggerInfo"]["toolInstances"], json!([]));
        assert_eq!(sent["commands"], json!([]));
    }

    #[test]
    fn remove_unknown_tool_is_not_found() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        let err = client(&transport)
            .remove_tool_from_mcp_trigger("ops-assistant", "ghost")
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool 'ghost' not found");
    }

    #[test]
    fn mcp_trigger_url_sentinels() {
        let transport = MockTransport::new();
        transport.reply_json(200, mcp_trigger());
        transport.reply_json(200, json!({"name": "nightly", "kind": "cron"}));
        transport.reply(HttpResponse::new(404, ""));
        transport.reply_json(200, json!({"triggers": []}));
        let c = client(&transport);

        assert_eq!(
            c.get_mcp_trigger_url("ops-assistant").unwrap().as_deref(),
            Some("https://mcp.example.com/ops-assistant")
        );
        assert_eq!(c.get_mcp_trigger_url("nightly").unwrap(), None);
        assert_eq!(c.get_mcp_trigger_url("missing").unwrap(), None);
    }

    #[test]
    fn delete_trigger_sends_delete() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(204, ""));
        assert!(client(&transport).delete_trigger("old").unwrap());
        let request = transport.last_request();
        assert_eq!(request.method, HttpMethod::Delete);
        assert!(request.url.ends_with("/workspace/v2/triggers/old"));
    }

    #[test]
    fn tool_targets_skip_blank_overrides() {
        let (commands, connections) = tool_targets(&[
            json!({"overrides": {"command": "", "connection": "web-1"}}),
            json!({"overrides": {}}),
            json!({}),
        ]);
        assert!(commands.is_empty());
        assert_eq!(connections, ["web-1"]);
    }
}
