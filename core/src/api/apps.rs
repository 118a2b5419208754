//! Apps.

use serde_json::Value;

use super::APPS;
use crate::client::{into_object, require_object_field, OpsBeaconClient};
use crate::error::Result;
use crate::executor::{segment, ApiCall};
use crate::transport::Transport;
use crate::types::JsonObject;

impl<T: Transport> OpsBeaconClient<T> {
    /// Create the app named by `app["name"]`, or replace it if it exists.
    pub fn create_or_update_app(&self, app: &JsonObject) -> Result<JsonObject> {
        require_object_field(app, "app", "name")?;
        let name = app.get("name").and_then(Value::as_str).unwrap_or_default();
        let call = ApiCall::put(format!("{APPS}/{}", segment(name)))
            .json(Value::Object(app.clone()))
            .resource("App", name);
        Ok(into_object(self.executor().json(call)?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::client::{into_object, tests::client};
    use crate::error::ErrorKind;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::transport::mock::MockTransport;

    #[test]
    fn upsert_puts_to_named_path() {
        let transport = MockTransport::new();
        transport.reply_json(200, json!({"name": "status-board", "version": 2}));
        let app = into_object(json!({"name": "status-board", "commands": ["uptime"]}));
        let saved = client(&transport).create_or_update_app(&app).unwrap();
        assert_eq!(saved["version"], 2);

        let request = transport.last_request();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://api.test.opsbeacon.com/workspace/v2/apps/status-board");
    }

    #[test]
    fn empty_response_is_empty_object() {
        let transport = MockTransport::new();
        transport.reply(HttpResponse::new(204, ""));
        let saved = client(&transport)
            .create_or_update_app(&into_object(json!({"name": "x"})))
            .unwrap();
        assert!(saved.is_empty());
    }

    #[test]
    fn name_is_required() {
        let transport = MockTransport::new();
        let c = client(&transport);
        assert_eq!(
            c.create_or_update_app(&into_object(json!({}))).unwrap_err().to_string(),
            "App data is required"
        );
        assert_eq!(
            c.create_or_update_app(&into_object(json!({"name": ""}))).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(transport.calls(), 0);
    }
}
