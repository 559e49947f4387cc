//! Change notification payloads
//!
//! Wire shapes for the notification batches the search platform posts to the
//! webhook receiver. Payloads are parsed leniently: anything the dispatcher
//! does not understand becomes [`ResourceData::Unrecognized`] instead of a
//! parse failure for the whole batch.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// `@odata.type` tag identifying a connector lifecycle payload (matched case-insensitively).
pub const CONNECTOR_RESOURCE_TYPE: &str = "#microsoft.graph.connector";

/// Notification batch posted to the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationCollection {
    #[serde(default, deserialize_with = "lenient_notifications")]
    pub value: Option<Vec<ChangeNotification>>,
    #[serde(rename = "validationTokens", default)]
    pub validation_tokens: Option<Vec<String>>,
}

impl NotificationCollection {
    /// Parse a raw request body. Returns `None` when the body is empty, not
    /// JSON, or does not have the collection shape.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }

        serde_json::from_slice(bytes).ok()
    }
}

/// Each element is classified on its own so one malformed sibling cannot sink the batch.
fn lenient_notifications<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ChangeNotification>>, D::Error>
where
    D: Deserializer<'de>,
{
    let elements = Option::<Vec<JsonValue>>::deserialize(deserializer)?;
    Ok(elements.map(|elements| elements.iter().map(ChangeNotification::from_value).collect()))
}

/// One event in a notification batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_data: Option<JsonValue>,
}

impl ChangeNotification {
    /// Lenient element parse. A notification whose envelope does not fit keeps
    /// only its `resourceData`, which is classified later like any other.
    pub fn from_value(value: &JsonValue) -> Self {
        ChangeNotification::deserialize(value).unwrap_or_else(|_| ChangeNotification {
            resource_data: value.get("resourceData").cloned(),
            ..ChangeNotification::default()
        })
    }

    /// Classify the resource data carried by this notification.
    pub fn resource_data(&self) -> ResourceData {
        match &self.resource_data {
            Some(value) => ResourceData::from_value(value),
            None => ResourceData::Unrecognized { odata_type: None },
        }
    }
}

/// Desired lifecycle state declared by a connector notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Enabled,
    Disabled,
}

impl ConnectorState {
    /// Only the literal `enabled` enables; every other value is a disable request.
    pub fn parse(raw: &str) -> Self {
        if raw == "enabled" {
            ConnectorState::Enabled
        } else {
            ConnectorState::Disabled
        }
    }
}

/// Connector lifecycle payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorResourceData {
    /// Connector identity assigned by the platform.
    pub connector_id: String,
    pub state: ConnectorState,
    /// One-time provisioning ticket; present on enable notifications.
    pub connectors_ticket: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConnectorResourceData {
    id: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    connectors_ticket: Option<String>,
}

/// Recognized resource data kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceData {
    Connector(ConnectorResourceData),
    Unrecognized { odata_type: Option<String> },
}

impl ResourceData {
    pub fn from_value(value: &JsonValue) -> Self {
        let odata_type = value
            .get("@odata.type")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let is_connector = odata_type
            .as_deref()
            .is_some_and(|tag| tag.eq_ignore_ascii_case(CONNECTOR_RESOURCE_TYPE));
        if !is_connector {
            return ResourceData::Unrecognized { odata_type };
        }

        match RawConnectorResourceData::deserialize(value) {
            Ok(raw) => ResourceData::Connector(ConnectorResourceData {
                connector_id: raw.id,
                state: ConnectorState::parse(raw.state.as_deref().unwrap_or_default()),
                connectors_ticket: raw.connectors_ticket.filter(|t| !t.is_empty()),
            }),
            // A connector payload without an identity cannot be reconciled.
            Err(_) => ResourceData::Unrecognized { odata_type },
        }
    }
}
