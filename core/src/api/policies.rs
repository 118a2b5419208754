//! Execution policies: which commands may run on which connections.

use serde_json::{json, Value};
use tracing::debug;

use super::POLICIES;
use crate::client::{find_named, into_object, list_field, require, OpsBeaconClient};
use crate::error::{OpsBeaconError, Result};
use crate::executor::{segment, ApiCall};
use crate::transport::Transport;
use crate::types::{JsonObject, NewPolicy};

impl<T: Transport> OpsBeaconClient<T> {
    pub fn policies(&self) -> Result<Vec<Value>> {
        let body = self.executor().json(ApiCall::get(POLICIES))?;
        Ok(list_field(body, "policies"))
    }

    pub fn create_policy(&self, policy: NewPolicy) -> Result<JsonObject> {
        require(&policy.name, "name")?;
        let payload = json!({
            "name": policy.name,
            "description": policy.description,
            "commands": policy.commands,
            "connections": policy.connections,
        });
        let body = self.executor().json(ApiCall::post(POLICIES).json(payload))?;
        Ok(into_object(body))
    }

    /// Fetch one policy, searching the listing if the direct lookup fails.
    pub fn get_policy(&self, name: &str) -> Result<JsonObject> {
        require(name, "name")?;
        let call = ApiCall::get(format!("{POLICIES}/{}", segment(name))).resource("Policy", name);
        match self.executor().json(call) {
            Ok(body) => Ok(into_object(body)),
            Err(err @ (OpsBeaconError::ResourceNotFound { .. } | OpsBeaconError::Api { .. })) => {
                debug!(policy = name, error = %err, "direct policy lookup failed, searching list");
                find_named(self.policies()?, name).ok_or_else(|| OpsBeaconError::not_found("Policy", name))
            }
            Err(other) => Err(other),
        }
    }

    pub fn delete_policy(&self, name: &str) -> Result<bool> {
        require(name, "name")?;
        self.executor().execute(
            ApiCall::delete(format!("{POLICIES}/{}", segment(name))).resource("Policy", name),
        )?;
        Ok(true)
    }
}
