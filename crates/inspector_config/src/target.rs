use serde::{Deserialize, Serialize};

use crate::defaults::{
    default_browser, default_protocol_version, default_target_description, default_target_id,
    default_target_title, default_target_type,
};

/// Metadata advertised to debugger front-ends through the discovery documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_id")]
    pub id: String,
    #[serde(default = "default_target_title")]
    pub title: String,
    #[serde(default = "default_target_description")]
    pub description: String,
    /// Reported as `type` in the target list
    #[serde(rename = "type", default = "default_target_type")]
    pub target_type: String,
    /// Reported as `Browser` in the version document
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            id: default_target_id(),
            title: default_target_title(),
            description: default_target_description(),
            target_type: default_target_type(),
            browser: default_browser(),
            protocol_version: default_protocol_version(),
        }
    }
}
