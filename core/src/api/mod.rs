//! Endpoint methods, grouped by resource.
//!
//! Each submodule adds an `impl` block to `OpsBeaconClient`.

mod apps;
mod execution;
mod files;
mod mcp;
mod policies;
mod triggers;
mod workspace;

pub const COMMANDS: &str = "/workspace/v2/commands";
pub const CONNECTIONS: &str = "/workspace/v2/connections";
pub const USERS: &str = "/workspace/v2/users";
pub const GROUPS: &str = "/workspace/v2/policy/group";
pub const FILES: &str = "/workspace/v2/files";
pub const FILE_URL: &str = "/workspace/v2/file-url";
pub const TRIGGERS: &str = "/workspace/v2/triggers";
pub const POLICIES: &str = "/workspace/v2/policy";
pub const APPS: &str = "/workspace/v2/apps";
pub const EXECUTE: &str = "/trigger/v1/api";
