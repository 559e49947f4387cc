//! # Data Models
//!
//! Wire models shared by the receiver, the registry client and the content push.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod external_connection;
pub mod external_item;
pub mod notification;

pub use external_connection::{
    ActivitySettings, ConnectionOperation, DisplayTemplate, ExternalConnection, OperationStatus,
    SearchSettings, UrlMatchInfo, UrlToItemResolver,
};
pub use external_item::{Acl, ActivityType, ExternalActivity, ExternalItem, ItemContent};
pub use notification::{
    ChangeNotification, ConnectorResourceData, ConnectorState, NotificationCollection,
    ResourceData,
};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "graph-connector".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
