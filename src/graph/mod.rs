//! Search platform connection registry client
//!
//! REST client for the external connection management API: list, create and
//! delete connections, register schemas (waiting on the resulting long-running
//! operation), and push items and activities. Authenticates with an app-only
//! token from the client credentials grant, cached until shortly before expiry.

pub mod operations;
pub mod schema;

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::{
    ActivitySettings, ConnectionOperation, ExternalActivity, ExternalConnection, ExternalItem,
    SearchSettings,
    external_connection::ConnectionPage,
};
use crate::registry::{ConnectionRegistry, NewConnection};
use operations::{DEFAULT_POLL_INTERVAL, OperationPoller, OperationSource};

/// Header carrying the one-time provisioning ticket on lifecycle-driven creates.
pub const PROVISIONING_TICKET_HEADER: &str = "GraphConnectors-Ticket";

const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Refresh the cached token this long before it actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

static CONNECTION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{3,32}$").expect("connection id pattern is valid")
});

/// Registry client errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("schema registration response has no usable operation location")]
    MissingOperationLocation,

    #[error("invalid connection id '{0}': expected 3-32 alphanumeric characters")]
    InvalidConnectionId(String),

    #[error("operation failed: {message}")]
    OperationFailed { message: String },
}

/// Settings for [`GraphClient`].
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    pub api_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Owner and repository used to build URL resolvers.
    pub github_owner: String,
    pub github_repo: String,
}

impl GraphClientConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_base: config.graph_api_base.clone(),
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            github_owner: config.github_owner.clone(),
            github_repo: config.github_repo.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP implementation of [`ConnectionRegistry`].
pub struct GraphClient {
    http_client: Client,
    config: GraphClientConfig,
    poll_interval: Duration,
    token: RwLock<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(http_client: Client, config: GraphClientConfig) -> Self {
        Self {
            http_client,
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            token: RwLock::new(None),
        }
    }

    pub fn from_config(config: &AppConfig, http_client: Client) -> Self {
        Self::new(http_client, GraphClientConfig::from_app_config(config))
    }

    /// Override the operation polling interval (tests use a few milliseconds).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Current app-only access token, acquiring a new one when needed.
    async fn access_token(&self) -> Result<String, GraphError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref()
                && Instant::now() < token.refresh_at
            {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.access_token.clone());
        }

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_DEFAULT_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| GraphError::TokenAcquisition(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::TokenAcquisition(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::TokenAcquisition(format!("invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = lifetime.as_secs(), "Acquired app-only access token");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at,
        });

        Ok(token.access_token)
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, GraphError> {
        let token = self.access_token().await?;
        Ok(self
            .http_client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    /// Create or replace an item in a connection.
    pub async fn put_item(
        &self,
        connection_id: &str,
        item: &ExternalItem,
    ) -> Result<(), GraphError> {
        let url = self.url(&format!(
            "/external/connections/{}/items/{}",
            connection_id, item.id
        ));
        let response = self.request(Method::PUT, &url).await?.json(item).send().await?;
        ensure_success(response).await?;
        debug!(connection_id, item_id = %item.id, "Item pushed");
        Ok(())
    }

    /// Record activities against an existing item.
    pub async fn add_activities(
        &self,
        connection_id: &str,
        item_id: &str,
        activities: &[ExternalActivity],
    ) -> Result<(), GraphError> {
        if activities.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!(
            "/external/connections/{}/items/{}/microsoft.graph.externalConnectors.addActivities",
            connection_id, item_id
        ));
        let body = serde_json::json!({ "activities": activities });
        let response = self.request(Method::POST, &url).await?.json(&body).send().await?;
        ensure_success(response).await?;
        debug!(connection_id, item_id, count = activities.len(), "Activities added");
        Ok(())
    }
}

/// Validate a connection id before it is sent anywhere.
pub fn validate_connection_id(id: &str) -> Result<(), GraphError> {
    if CONNECTION_ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(GraphError::InvalidConnectionId(id.to_string()))
    }
}

/// Operation id is the last path segment of the `Location` header.
fn operation_id_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

async fn ensure_success(response: Response) -> Result<Response, GraphError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GraphError::Api {
        status,
        message: api_error_message(&body),
    })
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => match (envelope.error.code, envelope.error.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "unknown error".to_string(),
        },
        Err(_) => body.chars().take(512).collect(),
    }
}

#[async_trait]
impl ConnectionRegistry for GraphClient {
    async fn list_connections(&self) -> Result<Vec<ExternalConnection>, GraphError> {
        let mut connections = Vec::new();
        let mut next = Some(self.url("/external/connections"));

        while let Some(url) = next.take() {
            let response = self.request(Method::GET, &url).await?.send().await?;
            let page: ConnectionPage = ensure_success(response)
                .await?
                .json()
                .await
                .map_err(|e| GraphError::InvalidResponse(format!("connection list: {}", e)))?;

            connections.extend(page.value);
            next = page.next_link;
        }

        debug!(count = connections.len(), "Listed connections");
        Ok(connections)
    }

    async fn create_connection(
        &self,
        request: NewConnection,
    ) -> Result<ExternalConnection, GraphError> {
        validate_connection_id(&request.id)?;

        let content_type = request.content_type;
        let connection = ExternalConnection {
            id: Some(request.id.clone()),
            name: Some(request.name),
            description: request.description,
            connector_id: request
                .provisioning
                .as_ref()
                .map(|p| p.connector_id.clone()),
            activity_settings: Some(ActivitySettings {
                url_to_item_resolvers: vec![schema::url_resolver(
                    content_type,
                    &self.config.github_owner,
                    &self.config.github_repo,
                )],
            }),
            search_settings: Some(SearchSettings {
                search_result_templates: vec![schema::result_template(content_type)],
            }),
            state: None,
        };

        let mut builder = self
            .request(Method::POST, &self.url("/external/connections"))
            .await?
            .json(&connection);
        if let Some(provisioning) = &request.provisioning {
            builder = builder.header(PROVISIONING_TICKET_HEADER, &provisioning.ticket);
        }

        let response = ensure_success(builder.send().await?).await?;
        let body = response.bytes().await?;

        info!(
            connection_id = %request.id,
            %content_type,
            provisioned = request.provisioning.is_some(),
            "Connection created"
        );

        if body.is_empty() {
            return Ok(connection);
        }
        serde_json::from_slice(&body)
            .map_err(|e| GraphError::InvalidResponse(format!("created connection: {}", e)))
    }

    async fn delete_connection(&self, id: Option<&str>) -> Result<(), GraphError> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            debug!("Delete requested without a connection id; nothing to do");
            return Ok(());
        };

        let url = self.url(&format!("/external/connections/{}", id));
        let response = self.request(Method::DELETE, &url).await?.send().await?;
        ensure_success(response).await?;

        info!(connection_id = id, "Connection deleted");
        Ok(())
    }

    async fn register_schema(&self, id: &str, schema: &JsonValue) -> Result<(), GraphError> {
        let url = self.url(&format!("/external/connections/{}/schema", id));
        let response = self
            .request(Method::POST, &url)
            .await?
            .json(schema)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let operation_id = response
            .headers()
            .get("Location")
            .and_then(|value| value.to_str().ok())
            .and_then(operation_id_from_location)
            .ok_or_else(|| {
                warn!(connection_id = id, "Schema accepted without an operation location");
                GraphError::MissingOperationLocation
            })?;

        info!(connection_id = id, operation_id = %operation_id, "Schema submitted, waiting for provisioning");

        OperationPoller::new(self, self.poll_interval)
            .wait_for_completion(id, &operation_id)
            .await?;

        info!(connection_id = id, "Schema registered");
        Ok(())
    }
}

#[async_trait]
impl OperationSource for GraphClient {
    async fn get_operation(
        &self,
        connection_id: &str,
        operation_id: &str,
    ) -> Result<ConnectionOperation, GraphError> {
        let url = self.url(&format!(
            "/external/connections/{}/operations/{}",
            connection_id, operation_id
        ));
        let response = self.request(Method::GET, &url).await?.send().await?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| GraphError::InvalidResponse(format!("operation status: {}", e)))
    }
}
