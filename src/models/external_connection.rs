//! External connection records
//!
//! Serde shapes for the connection management API: connection records,
//! their activity and search settings, and long-running operations.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Durable configuration record representing one sync target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set only for connections created through the provisioning ticket flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_settings: Option<ActivitySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_settings: Option<SearchSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySettings {
    #[serde(default)]
    pub url_to_item_resolvers: Vec<UrlToItemResolver>,
}

/// Maps a URL shared by users onto an item id of this connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlToItemResolver {
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub url_match_info: UrlMatchInfo,
    pub item_id: String,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlMatchInfo {
    pub base_urls: Vec<String>,
    pub url_pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettings {
    #[serde(default)]
    pub search_result_templates: Vec<DisplayTemplate>,
}

/// Result display template; `layout` is an adaptive card document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayTemplate {
    pub id: String,
    pub priority: u32,
    pub layout: JsonValue,
}

/// Page of connections returned by the list endpoint.
#[derive(Debug, Deserialize)]
pub struct ConnectionPage {
    #[serde(default)]
    pub value: Vec<ExternalConnection>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Status of a long-running server-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Completed,
    Failed,
    /// `inprogress`, `unspecified` and any value added later.
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Long-running operation created by schema registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOperation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<OperationStatus>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl ConnectionOperation {
    /// Absent status counts as still pending.
    pub fn status(&self) -> OperationStatus {
        self.status.unwrap_or(OperationStatus::Pending)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.message.as_deref())
    }
}
