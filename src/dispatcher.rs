//! Notification Dispatcher
//!
//! Reconciles connector lifecycle notifications against the connections that
//! actually exist. A batch is acted on only when every accompanying token
//! validates. Each recognized notification is then handled on its own: a
//! failure is logged and the next notification still runs.
//!
//! Enable and disable are expressed purely through connection existence:
//! enabling creates a connection (plus schema) if none carries the connector
//! id, disabling deletes the one that does.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::graph::GraphError;
use crate::graph::schema;
use crate::models::{
    ChangeNotification, ConnectorResourceData, ConnectorState, NotificationCollection,
    ResourceData,
};
use crate::registry::{ConnectionRegistry, ContentType, NewConnection};
use crate::webhook_verification::{TokenValidation, validate_all};

/// Display name of connections created by the lifecycle flow.
pub const LIFECYCLE_CONNECTION_NAME: &str = "GitHub issues";
/// Description of connections created by the lifecycle flow.
pub const LIFECYCLE_CONNECTION_DESCRIPTION: &str =
    "Issues from GitHub, provisioned by the connector lifecycle";

const LIFECYCLE_CONNECTION_ID_PREFIX: &str = "ghissues";

/// What happened to a whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Missing notification list or validation tokens; nothing was done.
    Ignored,
    /// At least one token failed validation; nothing was done.
    Rejected,
    /// Tokens validated; one outcome per notification, in batch order.
    Processed(Vec<NotificationOutcome>),
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Resource data of a kind this service does not handle.
    Skipped,
    AlreadyEnabled { connection_id: Option<String> },
    Created { connection_id: String },
    AlreadyDisabled,
    Deleted { connection_id: String },
    Failed { message: String },
}

/// Validates notification batches and drives connection lifecycle changes.
#[derive(Clone)]
pub struct NotificationDispatcher {
    validator: Arc<dyn TokenValidation>,
    registry: Arc<dyn ConnectionRegistry>,
}

impl NotificationDispatcher {
    pub fn new(validator: Arc<dyn TokenValidation>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            validator,
            registry,
        }
    }

    /// Process one notification batch to completion.
    pub async fn dispatch(&self, payload: NotificationCollection) -> DispatchOutcome {
        let (Some(notifications), Some(tokens)) = (payload.value, payload.validation_tokens) else {
            debug!("Notification payload lacks notifications or validation tokens; ignoring");
            return DispatchOutcome::Ignored;
        };
        if tokens.is_empty() {
            debug!("Notification payload carries no validation tokens; ignoring");
            return DispatchOutcome::Ignored;
        }

        if !validate_all(self.validator.as_ref(), &tokens).await {
            warn!(
                tokens = tokens.len(),
                notifications = notifications.len(),
                "Validation token check failed; discarding notification batch"
            );
            return DispatchOutcome::Rejected;
        }

        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in &notifications {
            outcomes.push(self.handle_notification(notification).await);
        }

        DispatchOutcome::Processed(outcomes)
    }

    async fn handle_notification(&self, notification: &ChangeNotification) -> NotificationOutcome {
        match notification.resource_data() {
            ResourceData::Connector(data) => {
                let connector_id = data.connector_id.clone();
                match self.reconcile(data).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(connector_id = %connector_id, error = %err, "Connector lifecycle change failed");
                        NotificationOutcome::Failed {
                            message: err.to_string(),
                        }
                    }
                }
            }
            ResourceData::Unrecognized { odata_type } => {
                debug!(odata_type = ?odata_type, "Skipping notification with unrecognized resource data");
                NotificationOutcome::Skipped
            }
        }
    }

    async fn reconcile(
        &self,
        data: ConnectorResourceData,
    ) -> Result<NotificationOutcome, GraphError> {
        let existing = self
            .registry
            .find_by_connector_id(&data.connector_id)
            .await?;

        match (data.state, existing) {
            (ConnectorState::Enabled, Some(connection)) => {
                info!(connector_id = %data.connector_id, connection_id = ?connection.id, "Connector already enabled");
                Ok(NotificationOutcome::AlreadyEnabled {
                    connection_id: connection.id,
                })
            }
            (ConnectorState::Enabled, None) => {
                let connection_id = lifecycle_connection_id();
                info!(connector_id = %data.connector_id, connection_id = %connection_id, "Enabling connector");

                let request = NewConnection::new(
                    connection_id.clone(),
                    LIFECYCLE_CONNECTION_NAME,
                    ContentType::Issues,
                )
                .with_description(Some(LIFECYCLE_CONNECTION_DESCRIPTION.to_string()))
                .with_provisioning(data.connectors_ticket, Some(data.connector_id));

                self.registry.create_connection(request).await?;
                self.registry
                    .register_schema(&connection_id, &schema::issues_schema())
                    .await?;

                Ok(NotificationOutcome::Created { connection_id })
            }
            (ConnectorState::Disabled, Some(connection)) => {
                let Some(connection_id) = connection.id else {
                    warn!(
                        connector_id = %data.connector_id,
                        "Matched connection has no id; nothing to delete"
                    );
                    return Ok(NotificationOutcome::AlreadyDisabled);
                };
                info!(connector_id = %data.connector_id, connection_id = %connection_id, "Disabling connector");
                self.registry
                    .delete_connection(Some(&connection_id))
                    .await?;
                Ok(NotificationOutcome::Deleted { connection_id })
            }
            (ConnectorState::Disabled, None) => {
                info!(connector_id = %data.connector_id, "Connector already disabled");
                Ok(NotificationOutcome::AlreadyDisabled)
            }
        }
    }
}

/// Fresh id for a lifecycle-created connection: `ghissues` + 20 hex characters.
fn lifecycle_connection_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", LIFECYCLE_CONNECTION_ID_PREFIX, &suffix[..20])
}
