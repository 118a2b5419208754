//! Commands, connections, users and groups.

use serde_json::Value;

use super::{COMMANDS, CONNECTIONS, GROUPS, USERS};
use crate::client::{list_field, require, require_object_field, OpsBeaconClient};
use crate::error::Result;
use crate::executor::{segment, ApiCall};
use crate::transport::Transport;
use crate::types::JsonObject;

impl<T: Transport> OpsBeaconClient<T> {
    /// Commands defined in the workspace, in server order.
    pub fn commands(&self) -> Result<Vec<Value>> {
        let body = self.executor().json(ApiCall::get(COMMANDS))?;
        Ok(list_field(body, "commands"))
    }

    /// Connections (servers, clusters, cloud accounts) in the workspace.
    pub fn connections(&self) -> Result<Vec<Value>> {
        let body = self.executor().json(ApiCall::get(CONNECTIONS))?;
        Ok(list_field(body, "connections"))
    }

    pub fn users(&self) -> Result<Vec<Value>> {
        let body = self.executor().json(ApiCall::get(USERS))?;
        Ok(list_field(body, "users"))
    }

    /// Invite a user. `user` must carry at least an `email`.
    pub fn add_user(&self, user: &JsonObject) -> Result<bool> {
        require_object_field(user, "user", "email")?;
        self.executor()
            .execute(ApiCall::post(USERS).json(Value::Object(user.clone())))?;
        Ok(true)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<bool> {
        require(user_id, "user_id")?;
        self.executor().execute(
            ApiCall::delete(format!("{USERS}/{}", segment(user_id))).resource("User", user_id),
        )?;
        Ok(true)
    }

    pub fn groups(&self) -> Result<Vec<Value>> {
        let body = self.executor().json(ApiCall::get(GROUPS))?;
        Ok(list_field(body, "groups"))
    }

    /// Create a group. `group` must carry at least a `name`.
    pub fn add_group(&self, group: &JsonObject) -> Result<bool> {
        require_object_field(group, "group", "name")?;
        self.executor()
            .execute(ApiCall::post(GROUPS).json(Value::Object(group.clone())))?;
        Ok(true)
    }

    pub fn delete_group(&self, group_name: &str) -> Result<bool> {
        require(group_name, "group_name")?;
        self.executor().execute(
            ApiCall::delete(format!("{GROUPS}/{}", segment(group_name))).resource("Group", group_name),
        )?;
        Ok(true)
    }
}
