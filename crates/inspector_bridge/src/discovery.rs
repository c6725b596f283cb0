//! HTTP discovery documents debugger front-ends poll to find the socket.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use inspector_config::target::TargetConfig;
use serde_json::{Value, json};

pub const NOT_FOUND_BODY: &str = "404 Not Found";

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Identity of the debug target as shown by front-ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub target_type: String,
    pub browser: String,
    pub protocol_version: String,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self::from(&TargetConfig::default())
    }
}

impl From<&TargetConfig> for TargetInfo {
    fn from(target: &TargetConfig) -> Self {
        Self {
            id: target.id.clone(),
            title: target.title.clone(),
            description: target.description.clone(),
            target_type: target.target_type.clone(),
            browser: target.browser.clone(),
            protocol_version: target.protocol_version.clone(),
        }
    }
}

/// The `version` and `list` documents, fixed for the listener's lifetime.
#[derive(Debug, Clone)]
pub struct DiscoveryDocuments {
    version: String,
    list: String,
    websocket_url: String,
}

impl DiscoveryDocuments {
    pub fn new(port: u16, target: &TargetInfo) -> Self {
        let websocket_url = format!("ws://127.0.0.1:{port}");

        let version = json!({
            "Browser": target.browser,
            "Protocol-Version": target.protocol_version,
        });
        let list = json!([{
            "description": target.description,
            "devtoolsFrontendUrl": format!(
                "devtools://devtools/bundled/js_app.html?experiments=true&v8only=true&ws=127.0.0.1:{port}"
            ),
            "id": target.id,
            "title": target.title,
            "type": target.target_type,
            "webSocketDebuggerUrl": websocket_url,
        }]);

        Self {
            version: render(&version),
            list: render(&list),
            websocket_url,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn list(&self) -> &str {
        &self.list
    }

    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    /// Routes a request path to its document. Query strings are ignored.
    pub fn respond(&self, path: &str) -> DiscoveryResponse {
        let path = path.split_once('?').map_or(path, |(path, _)| path);

        match path {
            "/json" | "/json/list" => DiscoveryResponse::json(self.list.clone()),
            "/json/version" => DiscoveryResponse::json(self.version.clone()),
            _ => DiscoveryResponse::not_found(),
        }
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub status: StatusCode,
    pub body: String,
}

impl DiscoveryResponse {
    fn json(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: NOT_FOUND_BODY.to_string(),
        }
    }
}

impl IntoResponse for DiscoveryResponse {
    fn into_response(self) -> Response {
        let content_type = if self.status == StatusCode::OK {
            JSON_CONTENT_TYPE
        } else {
            "text/plain; charset=UTF-8"
        };
        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}
