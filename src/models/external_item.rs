//! External items and activities pushed into a connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One searchable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalItem {
    pub id: String,
    pub acl: Vec<Acl>,
    /// Property values keyed by schema property name, including any
    /// `name@odata.type` annotations required for collections.
    pub properties: Map<String, JsonValue>,
    pub content: ItemContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub access_type: String,
}

impl Acl {
    /// Grants every user in the tenant access to the item.
    pub fn everyone() -> Self {
        Self {
            kind: "everyone".to_string(),
            value: "everyone".to_string(),
            access_type: "grant".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ItemContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    Created,
    Modified,
    Commented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// Something a user did to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalActivity {
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub start_date_time: DateTime<Utc>,
    pub performed_by: Identity,
}

impl ExternalActivity {
    pub fn by_user(kind: ActivityType, at: DateTime<Utc>, user_id: &str) -> Self {
        Self {
            odata_type: "#microsoft.graph.externalConnectors.externalActivity".to_string(),
            kind,
            start_date_time: at,
            performed_by: Identity {
                kind: "user".to_string(),
                id: user_id.to_string(),
            },
        }
    }
}
