//! Connection registry abstraction
//!
//! The dispatcher and the command line talk to external connections through
//! [`ConnectionRegistry`]; [`crate::graph::GraphClient`] is the HTTP
//! implementation.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::graph::GraphError;
use crate::models::ExternalConnection;

/// Kind of content a connection carries; selects resolver, template and schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ContentType {
    Issues,
    Repositories,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Issues => write!(f, "issues"),
            ContentType::Repositories => write!(f, "repositories"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "issues" | "issue" => Ok(ContentType::Issues),
            "repositories" | "repository" | "repos" => Ok(ContentType::Repositories),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// Provisioning credentials attached to a lifecycle-driven create.
///
/// The ticket header and the connector id are only meaningful together, so
/// they travel as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioning {
    pub ticket: String,
    pub connector_id: String,
}

impl Provisioning {
    /// Pair the two values; if either is missing neither is forwarded.
    pub fn pair(ticket: Option<String>, connector_id: Option<String>) -> Option<Self> {
        match (ticket, connector_id) {
            (Some(ticket), Some(connector_id)) => Some(Self {
                ticket,
                connector_id,
            }),
            _ => None,
        }
    }
}

/// Parameters for creating a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub id: String,
    pub name: String,
    pub content_type: ContentType,
    pub description: Option<String>,
    pub provisioning: Option<Provisioning>,
}

impl NewConnection {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_type,
            description: None,
            provisioning: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_provisioning(
        mut self,
        ticket: Option<String>,
        connector_id: Option<String>,
    ) -> Self {
        self.provisioning = Provisioning::pair(ticket, connector_id);
        self
    }
}

/// CRUD surface over external connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Every connection, with pagination already resolved.
    async fn list_connections(&self) -> Result<Vec<ExternalConnection>, GraphError>;

    async fn create_connection(
        &self,
        request: NewConnection,
    ) -> Result<ExternalConnection, GraphError>;

    /// Deleting with no id is a no-op.
    async fn delete_connection(&self, id: Option<&str>) -> Result<(), GraphError>;

    /// Submit a schema and wait until the resulting operation terminates.
    async fn register_schema(&self, id: &str, schema: &JsonValue) -> Result<(), GraphError>;

    /// Find the connection provisioned for `connector_id`.
    ///
    /// The default is a linear scan over a fresh listing; implementations
    /// with an index may override it.
    async fn find_by_connector_id(
        &self,
        connector_id: &str,
    ) -> Result<Option<ExternalConnection>, GraphError> {
        let connections = self.list_connections().await?;
        Ok(connections
            .into_iter()
            .find(|c| c.connector_id.as_deref() == Some(connector_id)))
    }
}
