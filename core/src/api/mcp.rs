//! A smoke test of an MCP server over JSON-RPC 2.0.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::{require, OpsBeaconClient};
use crate::error::{OpsBeaconError, Result};
use crate::executor::decode_json;
use crate::http::HttpMethod;
use crate::transport::Transport;
use crate::types::McpProbeReport;

const PROTOCOL_VERSION: &str = "0.1.0";

impl<T: Transport> OpsBeaconClient<T> {
    /// Initialize a session with an MCP server, list its tools and call one.
    ///
    /// `tool` selects the tool to call; the first listed tool is used
    /// otherwise. A failing step is recorded as `{"error": ...}` and ends
    /// the probe early instead of returning `Err`.
    pub fn probe_mcp_server(&self, mcp_url: &str, token: &str, tool: Option<&str>) -> Result<McpProbeReport> {
        require(mcp_url, "mcp_url")?;
        require(token, "token")?;
        let mut report = McpProbeReport::default();

        let initialize = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "opsbeacon-rust-sdk",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            },
        });
        match self.rpc(mcp_url, token, &initialize) {
            Ok(response) => report.initialize = Some(response),
            Err(err) => {
                report.initialize = Some(step_error(&err));
                return Ok(report);
            }
        }

        let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}});
        let tools = match self.rpc(mcp_url, token, &list) {
            Ok(response) => {
                let tools = response
                    .pointer("/result/tools")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                report.tools = Some(response);
                tools
            }
            Err(err) => {
                report.tools = Some(step_error(&err));
                return Ok(report);
            }
        };

        let selected = match tool {
            Some(name) => Some(name.to_string()),
            None => tools
                .first()
                .and_then(|t| t.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        let Some(name) = selected else {
            report.execution = Some(json!({"message": "No tools available to execute"}));
            return Ok(report);
        };

        let call = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": name, "arguments": {}},
        });
        match self.rpc(mcp_url, token, &call) {
            Ok(response) => {
                report.success = response.get("result").is_some();
                report.execution = Some(response);
            }
            Err(err) => report.execution = Some(step_error(&err)),
        }
        Ok(report)
    }

    fn rpc(&self, url: &str, token: &str, payload: &Value) -> Result<Value> {
        let method = payload["method"].as_str().unwrap_or_default();
        if self.debug() {
            debug!(url, method, "MCP request");
        }
        let response = self
            .executor()
            .external(HttpMethod::Post, url, Some(payload), Some(token))?;
        if !response.is_success() {
            warn!(url, method, status = response.status, "MCP step failed");
            return Err(OpsBeaconError::Mcp {
                message: format!("HTTP {}: {}", response.status, response.text().trim()),
                trigger_name: None,
            });
        }
        decode_json(&response)
    }
}

fn step_error(err: &OpsBeaconError) -> Value {
    json!({"error": err.to_string()})
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::tests::client;
    use crate::error::ErrorKind;
    use crate::http::HttpResponse;
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportError;

    const MCP_URL: &str = "https://mcp.example.com/ops-assistant";

    fn rpc_bodies(transport: &MockTransport) -> Vec<Value> {
        transport
            .requests()
            .iter()
            .map(|r| serde_json::from_slice(r.body.as_deref().unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn full_probe_calls_first_tool() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"jsonrpc": "2.0", "id": 1, "result": {"serverInfo": {}}}));
        transport.reply_json(
            200,
            json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": [{"name": "disk"}, {"name": "uptime"}]}}),
        );
        transport.reply_json(200, json!({"jsonrpc": "2.0", "id": 3, "result": {"content": []}}));

        let report = client(&transport).probe_mcp_server(MCP_URL, "mcp-tok", None).unwrap();
        assert!(report.success);
        assert!(report.execution.unwrap().get("result").is_some());

        let bodies = rpc_bodies(&transport);
        let ids: Vec<i64> = bodies.iter().map(|b| b["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(bodies[0]["params"]["protocolVersion"], "0.1.0");
        assert_eq!(bodies[2]["params"], json!({"name": "disk", "arguments": {}}));

        let request = transport.last_request();
        assert_eq!(request.url, MCP_URL);
        assert_eq!(request.header("Authorization"), Some("Bearer mcp-tok"));
    }

    #[test]
    fn named_tool_is_used() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"result": {}}));
        transport.reply_json(200, json!({"result": {"tools": [{"name": "disk"}]}}));
        transport.reply_json(200, json!({"error": {"code": -32601, "message": "unknown tool"}}));

        let report = client(&transport)
            .probe_mcp_server(MCP_URL, "mcp-tok", Some("uptime"))
            .unwrap();
        assert!(!report.success);
        assert_eq!(rpc_bodies(&transport)[2]["params"]["name"], "uptime");
    }

    #[test]
    fn no_tools_reports_message() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"result": {}}));
        transport.reply_json(200, json!({"result": {"tools": []}}));

        let report = client(&transport).probe_mcp_server(MCP_URL, "mcp-tok", None).unwrap();
        assert_eq!(report.execution, Some(json!({"message": "No tools available to execute"})));
        assert!(!report.success);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn failed_step_is_recorded_and_stops_probe() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(401, "bad token"));

        let report = client(&transport).probe_mcp_server(MCP_URL, "wrong", None).unwrap();
        let error = report.initialize.unwrap();
        assert!(error["error"].as_str().unwrap().contains("401"));
        assert_eq!(report.tools, None);
        assert_eq!(report.execution, None);
        assert!(!report.success);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn transport_failure_is_recorded() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"result": {}}));
        transport.fail(TransportError::Connect("refused".to_string()));

        let report = client(&transport).probe_mcp_server(MCP_URL, "mcp-tok", None).unwrap();
        assert_eq!(
            report.tools,
            Some(json!({"error": format!("Failed to connect to {MCP_URL}")}))
        );
    }

    #[test]
    fn blank_url_or_token_is_rejected() {
        let transport = MockTransport::new();
        let c = client(&transport);
        assert_eq!(c.probe_mcp_server("", "t", None).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(c.probe_mcp_server(MCP_URL, " ", None).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
    }
}
