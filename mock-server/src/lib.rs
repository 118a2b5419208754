//! In-memory imitation of the OpsBeacon workspace API, for tests.
//!
//! # Design
//! All state lives in one `AppState` behind an `Arc`; tests keep a clone to
//! inspect the request counter after handing another clone to the server.
//! Resources are stored as raw JSON objects so the server accepts whatever
//! shape the client sends, the way the real API does.
//!
//! `/workspace/*` and `/trigger/*` need `Authorization: Bearer <token>`.
//! `/downloads/*`, `/mcp/*` and `/test/*` do not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_TOKEN: &str = "mock-api-token";

#[derive(Default)]
struct Workspace {
    commands: Vec<Value>,
    connections: Vec<Value>,
    users: Vec<Value>,
    groups: Vec<Value>,
    triggers: Vec<Value>,
    policies: Vec<Value>,
    apps: HashMap<String, Value>,
    files: HashMap<String, Vec<u8>>,
    next_user: u64,
}

impl Workspace {
    fn seeded() -> Self {
        Self {
            commands: vec![
                json!({"id": "cmd-1", "name": "check-disk", "description": "Check disk usage"}),
                json!({"id": "cmd-2", "name": "restart-service", "description": "Restart a service"}),
                json!({"id": "cmd-3", "name": "fail", "description": "Always exits non-zero"}),
            ],
            connections: vec![
                json!({"id": "conn-1", "name": "web-1", "type": "ssh"}),
                json!({"id": "conn-2", "name": "db-1", "type": "ssh"}),
            ],
            users: vec![
                json!({"id": "user-1", "email": "admin@example.com", "role": "admin"}),
                json!({"id": "user-2", "email": "dev@example.com", "role": "user"}),
            ],
            groups: vec![json!({"name": "developers", "members": ["dev@example.com"]})],
            triggers: vec![
                json!({"name": "nightly-cleanup", "kind": "cron", "description": "Nightly cleanup"}),
                json!({
                    "name": "ops-assistant",
                    "kind": "mcp",
                    "description": "Ops tools for assistants",
                    "triggerUrl": "http://localhost/mcp/ops-assistant",
                    "apiToken": "mcp-seed-token",
                    "commands": ["check-disk"],
                    "connections": ["web-1"],
                    "mcpTriggerInfo": {"toolInstances": [{
                        "instanceId": "seed-1",
                        "templateId": "seed-1",
                        "overrides": {"name": "disk", "command": "check-disk", "connection": "web-1"},
                    }]},
                }),
            ],
            policies: vec![json!({
                "name": "read-only",
                "description": "Inspection commands only",
                "commands": ["check-disk"],
                "connections": ["web-1", "db-1"],
            })],
            apps: HashMap::new(),
            files: HashMap::from([("welcome.txt".to_string(), b"hello from opsbeacon\n".to_vec())]),
            next_user: 3,
        }
    }
}

struct Shared {
    token: String,
    requests: AtomicUsize,
    workspace: RwLock<Workspace>,
}

/// Server state. Clones share the same workspace and counter.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

impl AppState {
    /// Seeded workspace that accepts `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Shared {
                token: token.into(),
                requests: AtomicUsize::new(0),
                workspace: RwLock::new(Workspace::seeded()),
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Requests received so far, on any route.
    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN)
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    let api = Router::new()
        .route("/workspace/v2/commands", get(list_commands))
        .route("/workspace/v2/connections", get(list_connections))
        .route("/workspace/v2/users", get(list_users).post(create_user))
        .route("/workspace/v2/users/{id}", delete(delete_user))
        .route("/workspace/v2/policy/group", get(list_groups).post(create_group))
        .route("/workspace/v2/policy/group/{name}", delete(delete_group))
        .route("/workspace/v2/files", post(upload_file))
        .route("/workspace/v2/file-url/{name}", get(file_url))
        .route("/workspace/v2/triggers", get(list_triggers).post(create_trigger))
        .route(
            "/workspace/v2/triggers/{name}",
            get(get_trigger).put(update_trigger).delete(delete_trigger),
        )
        .route("/workspace/v2/policy", get(list_policies).post(create_policy))
        .route("/workspace/v2/policy/{name}", get(get_policy).delete(delete_policy))
        .route("/workspace/v2/apps/{name}", put(upsert_app))
        .route("/trigger/v1/api", post(execute))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(api)
        .route("/downloads/{name}", get(download))
        .route("/mcp/{name}", post(mcp_rpc))
        .route("/test/status/{code}", get(status_reply).post(status_reply))
        .route("/test/slow/{millis}", get(slow_reply))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .with_state(state)
}

/// Serve the mock API on `listener` until the task is dropped.
pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock OpsBeacon API listening");
    }
    axum::serve(listener, app_with_state(state)).await
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "err": message.into() }))).into_response()
}

fn name_of(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

fn non_empty<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.inner.requests.fetch_add(1, Ordering::SeqCst);
    debug!(method = %request.method(), path = %request.uri().path(), "request");
    next.run(request).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token());
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return error(StatusCode::UNAUTHORIZED, "invalid or missing API token");
    }
    next.run(request).await
}

// --- commands, connections ---

async fn list_commands(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "commands": ws.commands }))
}

async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "connections": ws.connections }))
}

// --- users, groups ---

async fn list_users(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "users": ws.users }))
}

async fn create_user(State(state): State<AppState>, Json(mut user): Json<Value>) -> Response {
    if non_empty(&user, "email").is_none() {
        return error(StatusCode::BAD_REQUEST, "email is required");
    }
    let mut ws = state.inner.workspace.write().await;
    let id = format!("user-{}", ws.next_user);
    ws.next_user += 1;
    if let Value::Object(map) = &mut user {
        map.insert("id".to_string(), Value::String(id));
    }
    ws.users.push(user.clone());
    (StatusCode::CREATED, Json(user)).into_response()
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let before = ws.users.len();
    ws.users.retain(|u| {
        u.get("id").and_then(Value::as_str) != Some(id.as_str())
            && u.get("email").and_then(Value::as_str) != Some(id.as_str())
    });
    if ws.users.len() == before {
        return error(StatusCode::NOT_FOUND, format!("user {id} not found"));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_groups(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "groups": ws.groups }))
}

async fn create_group(State(state): State<AppState>, Json(group): Json<Value>) -> Response {
    let Some(name) = non_empty(&group, "name") else {
        return error(StatusCode::BAD_REQUEST, "name is required");
    };
    let mut ws = state.inner.workspace.write().await;
    if ws.groups.iter().any(|g| name_of(g) == Some(name)) {
        return error(StatusCode::CONFLICT, format!("group {name} already exists"));
    }
    ws.groups.push(group.clone());
    (StatusCode::CREATED, Json(group)).into_response()
}

async fn delete_group(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let before = ws.groups.len();
    ws.groups.retain(|g| name_of(g) != Some(name.as_str()));
    if ws.groups.len() == before {
        return error(StatusCode::NOT_FOUND, format!("group {name} not found"));
    }
    StatusCode::NO_CONTENT.into_response()
}

// --- files ---

async fn upload_file(State(state): State<AppState>, mut form: Multipart) -> Response {
    let mut file_name = None;
    let mut data = None;
    loop {
        let field = match form.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error(StatusCode::BAD_REQUEST, format!("malformed form: {e}")),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "filename" => file_name = field.text().await.ok(),
            "file" => data = field.bytes().await.ok(),
            _ => {}
        }
    }
    let (Some(file_name), Some(data)) = (file_name.filter(|n| !n.trim().is_empty()), data) else {
        return Json(json!({"success": false, "err": "filename and file are required"})).into_response();
    };
    let size = data.len();
    state
        .inner
        .workspace
        .write()
        .await
        .files
        .insert(file_name.clone(), data.to_vec());
    Json(json!({"success": true, "name": file_name, "size": size})).into_response()
}

async fn file_url(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let ws = state.inner.workspace.read().await;
    if !ws.files.contains_key(&name) {
        return error(StatusCode::NOT_FOUND, format!("file {name} not found"));
    }
    Json(json!({"success": true, "url": format!("/downloads/{name}")})).into_response()
}

async fn download(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let ws = state.inner.workspace.read().await;
    match ws.files.get(&name) {
        Some(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// --- execution ---

#[derive(Deserialize)]
struct ExecuteRequest {
    #[serde(rename = "commandLine")]
    command_line: Option<String>,
    command: Option<String>,
    connection: Option<String>,
    #[serde(default)]
    arguments: Vec<String>,
}

impl ExecuteRequest {
    /// `(connection, command, arguments)`; a command line reads
    /// `"connection: command arg..."`.
    fn target(self) -> Option<(String, String, Vec<String>)> {
        if let Some(line) = self.command_line {
            let (connection, rest) = line.split_once(':')?;
            let mut words = rest.split_whitespace().map(str::to_string);
            let command = words.next()?;
            return Some((connection.trim().to_string(), command, words.collect()));
        }
        Some((self.connection?, self.command?, self.arguments))
    }
}

async fn execute(State(state): State<AppState>, Json(request): Json<ExecuteRequest>) -> Response {
    let Some((connection, command, arguments)) = request.target() else {
        return error(StatusCode::BAD_REQUEST, "commandLine or command and connection are required");
    };
    let ws = state.inner.workspace.read().await;
    if !ws.connections.iter().any(|c| name_of(c) == Some(connection.as_str())) {
        return Json(json!({"success": false, "err": format!("connection {connection} not found")}))
            .into_response();
    }
    if command == "fail" {
        return Json(json!({
            "status": "failed",
            "error": "command exited with status 1",
            "output": "",
            "exitCode": 1,
        }))
        .into_response();
    }
    let invocation = std::iter::once(command.as_str())
        .chain(arguments.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    Json(json!({
        "status": "success",
        "executionId": Uuid::new_v4().to_string(),
        "output": format!("ran {invocation} on {connection}"),
        "exitCode": 0,
    }))
    .into_response()
}

// --- triggers ---

async fn list_triggers(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "triggers": ws.triggers }))
}

async fn create_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut trigger): Json<Value>,
) -> Response {
    let Some(name) = non_empty(&trigger, "name").map(str::to_string) else {
        return error(StatusCode::BAD_REQUEST, "name is required");
    };
    let mut ws = state.inner.workspace.write().await;
    if ws.triggers.iter().any(|t| name_of(t) == Some(name.as_str())) {
        return Json(json!({"err": format!("trigger {name} already exists")})).into_response();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let url = format!("http://{host}/mcp/{name}");
    let token = Uuid::new_v4().simple().to_string();
    if let Value::Object(map) = &mut trigger {
        map.insert("triggerUrl".to_string(), Value::String(url.clone()));
        map.insert("apiToken".to_string(), Value::String(token.clone()));
    }
    ws.triggers.push(trigger);
    Json(json!({"url": url, "apiToken": token})).into_response()
}

async fn get_trigger(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let ws = state.inner.workspace.read().await;
    match ws.triggers.iter().find(|t| name_of(t) == Some(name.as_str())) {
        Some(trigger) => Json(trigger.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("trigger {name} not found")),
    }
}

async fn update_trigger(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<Value>,
) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let Some(Value::Object(existing)) = ws.triggers.iter_mut().find(|t| name_of(t) == Some(name.as_str()))
    else {
        return error(StatusCode::NOT_FOUND, format!("trigger {name} not found"));
    };
    if let Value::Object(fields) = update {
        for (key, value) in fields {
            // The URL and token are assigned by the server.
            if key != "triggerUrl" && key != "apiToken" {
                existing.insert(key, value);
            }
        }
    }
    Json(Value::Object(existing.clone())).into_response()
}

async fn delete_trigger(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let before = ws.triggers.len();
    ws.triggers.retain(|t| name_of(t) != Some(name.as_str()));
    if ws.triggers.len() == before {
        return error(StatusCode::NOT_FOUND, format!("trigger {name} not found"));
    }
    StatusCode::NO_CONTENT.into_response()
}

// --- MCP ---

fn rpc_result(id: &Value, result: Value) -> Response {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}

fn rpc_error(id: &Value, code: i64, message: String) -> Response {
    Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})).into_response()
}

async fn mcp_rpc(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(call): Json<Value>,
) -> Response {
    let ws = state.inner.workspace.read().await;
    let Some(trigger) = ws
        .triggers
        .iter()
        .find(|t| name_of(t) == Some(name.as_str()) && t.get("kind").and_then(Value::as_str) == Some("mcp"))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let expected = trigger
        .get("apiToken")
        .and_then(Value::as_str)
        .map(|t| format!("Bearer {t}"));
    let presented = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if expected.is_none() || presented != expected.as_deref() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let tools: Vec<&Value> = trigger
        .pointer("/mcpTriggerInfo/toolInstances")
        .and_then(Value::as_array)
        .map(|instances| instances.iter().filter_map(|i| i.get("overrides")).collect())
        .unwrap_or_default();

    match call.get("method").and_then(Value::as_str).unwrap_or_default() {
        "initialize" => rpc_result(
            &id,
            json!({
                "protocolVersion": call.pointer("/params/protocolVersion").cloned().unwrap_or(Value::Null),
                "serverInfo": {"name": "mock-opsbeacon", "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {"tools": {}},
            }),
        ),
        "tools/list" => rpc_result(
            &id,
            json!({"tools": tools
                .iter()
                .map(|o| json!({"name": o.get("name"), "description": o.get("description")}))
                .collect::<Vec<_>>()}),
        ),
        "tools/call" => {
            let wanted = call.pointer("/params/name").and_then(Value::as_str).unwrap_or_default();
            match tools.iter().find(|o| name_of(o) == Some(wanted)) {
                Some(tool) => {
                    let command = tool.get("command").and_then(Value::as_str).unwrap_or_default();
                    let connection = tool.get("connection").and_then(Value::as_str).unwrap_or_default();
                    rpc_result(
                        &id,
                        json!({"content": [{"type": "text", "text": format!("ran {command} on {connection}")}]}),
                    )
                }
                None => rpc_error(&id, -32602, format!("unknown tool: {wanted}")),
            }
        }
        other => rpc_error(&id, -32601, format!("method not found: {other}")),
    }
}

// --- policies ---

async fn list_policies(State(state): State<AppState>) -> Json<Value> {
    let ws = state.inner.workspace.read().await;
    Json(json!({ "policies": ws.policies }))
}

async fn create_policy(State(state): State<AppState>, Json(policy): Json<Value>) -> Response {
    let Some(name) = non_empty(&policy, "name") else {
        return error(StatusCode::BAD_REQUEST, "name is required");
    };
    let mut ws = state.inner.workspace.write().await;
    if ws.policies.iter().any(|p| name_of(p) == Some(name)) {
        return error(StatusCode::CONFLICT, format!("policy {name} already exists"));
    }
    ws.policies.push(policy.clone());
    (StatusCode::CREATED, Json(policy)).into_response()
}

async fn get_policy(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let ws = state.inner.workspace.read().await;
    match ws.policies.iter().find(|p| name_of(p) == Some(name.as_str())) {
        Some(policy) => Json(policy.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("policy {name} not found")),
    }
}

async fn delete_policy(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let before = ws.policies.len();
    ws.policies.retain(|p| name_of(p) != Some(name.as_str()));
    if ws.policies.len() == before {
        return error(StatusCode::NOT_FOUND, format!("policy {name} not found"));
    }
    StatusCode::NO_CONTENT.into_response()
}

// --- apps ---

async fn upsert_app(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut app): Json<Value>,
) -> Response {
    let mut ws = state.inner.workspace.write().await;
    let version = ws
        .apps
        .get(&name)
        .and_then(|a| a.get("version"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
        + 1;
    if let Value::Object(map) = &mut app {
        map.insert("name".to_string(), Value::String(name.clone()));
        map.insert("version".to_string(), json!(version));
    }
    ws.apps.insert(name, app.clone());
    Json(app).into_response()
}

// --- test hooks ---

async fn status_reply(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    let mut response = error(status, format!("forced status {code}"));
    if status == StatusCode::TOO_MANY_REQUESTS {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
    }
    response
}

async fn slow_reply(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(json!({"ok": true, "delayMs": millis}))
}
