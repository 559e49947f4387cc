//! Shared helpers for integration tests.
//!
//! In-memory registry and validator doubles for the dispatcher, token minting
//! against the fixture keys, and a ready-made configuration.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use graph_connector::config::AppConfig;
use graph_connector::graph::GraphError;
use graph_connector::models::ExternalConnection;
use graph_connector::registry::{ConnectionRegistry, NewConnection};
use graph_connector::webhook_verification::TokenValidation;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value as JsonValue, json};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_key.pem");
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");
pub const SIGNING_KEY_ID: &str = "test-key-1";

pub const TEST_CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const TEST_TENANT_ID: &str = "contoso-tenant";

/// Configuration with every required value filled in.
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        client_id: TEST_CLIENT_ID.to_string(),
        tenant_id: TEST_TENANT_ID.to_string(),
        client_secret: "secret".to_string(),
        github_owner: "octo".to_string(),
        github_repo: "hello".to_string(),
        github_token: "gh-token".to_string(),
        placeholder_user_id: "placeholder-user".to_string(),
        ..AppConfig::default()
    }
}

/// Claims for a notification token; `exp_offset` is relative to now, in seconds.
pub fn token_claims(audience: &str, issuer: &str, exp_offset: i64) -> JsonValue {
    let now = Utc::now().timestamp();
    json!({
        "aud": audience,
        "iss": issuer,
        "iat": now - 10,
        "nbf": now - 10,
        "exp": now + exp_offset,
        "appid": "0bf30f3b-4a52-48df-9a82-234910c4a086",
    })
}

/// Sign `claims` with RS256 using the given PEM key and `kid`.
pub fn mint_token(key_pem: &str, kid: Option<&str>, claims: &JsonValue) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(key_pem.as_bytes()).expect("fixture key is valid");
    encode(&header, claims, &key).expect("token encodes")
}

/// A token the fixture key set accepts for [`test_config`].
pub fn valid_token() -> String {
    let issuer = format!("https://login.microsoftonline.com/{}/v2.0", TEST_TENANT_ID);
    mint_token(
        SIGNING_KEY_PEM,
        Some(SIGNING_KEY_ID),
        &token_claims(TEST_CLIENT_ID, &issuer, 3600),
    )
}

/// Accepts exactly the tokens it was given.
pub struct TokenSet {
    valid: HashSet<String>,
}

impl TokenSet {
    pub fn new(valid: &[&str]) -> Self {
        Self {
            valid: valid.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TokenValidation for TokenSet {
    async fn is_valid(&self, token: &str) -> bool {
        self.valid.contains(token)
    }
}

/// Registry call as observed by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    List,
    Create(NewConnection),
    Delete(Option<String>),
    RegisterSchema { id: String, schema: JsonValue },
}

/// In-memory registry that records every call.
#[derive(Default)]
pub struct RecordingRegistry {
    connections: Mutex<Vec<ExternalConnection>>,
    calls: Mutex<Vec<RegistryCall>>,
    failing_connector_ids: Mutex<HashSet<String>>,
}

impl RecordingRegistry {
    pub fn with_connections(connections: Vec<ExternalConnection>) -> Self {
        Self {
            connections: Mutex::new(connections),
            ..Self::default()
        }
    }

    /// Make creates provisioned for `connector_id` fail.
    pub fn fail_creates_for(&self, connector_id: &str) {
        self.failing_connector_ids
            .lock()
            .unwrap()
            .insert(connector_id.to_string());
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than listings.
    pub fn mutations(&self) -> Vec<RegistryCall> {
        self.calls()
            .into_iter()
            .filter(|call| *call != RegistryCall::List)
            .collect()
    }

    pub fn connections(&self) -> Vec<ExternalConnection> {
        self.connections.lock().unwrap().clone()
    }

    fn record(&self, call: RegistryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Connection record as the registry would report it.
pub fn connection(id: &str, connector_id: Option<&str>) -> ExternalConnection {
    ExternalConnection {
        id: Some(id.to_string()),
        name: Some(format!("Connection {}", id)),
        connector_id: connector_id.map(str::to_string),
        state: Some("ready".to_string()),
        ..ExternalConnection::default()
    }
}

#[async_trait]
impl ConnectionRegistry for RecordingRegistry {
    async fn list_connections(&self) -> Result<Vec<ExternalConnection>, GraphError> {
        self.record(RegistryCall::List);
        Ok(self.connections())
    }

    async fn create_connection(
        &self,
        request: NewConnection,
    ) -> Result<ExternalConnection, GraphError> {
        self.record(RegistryCall::Create(request.clone()));

        if let Some(provisioning) = &request.provisioning
            && self
                .failing_connector_ids
                .lock()
                .unwrap()
                .contains(&provisioning.connector_id)
        {
            return Err(GraphError::Api {
                status: 500,
                message: "create rejected".to_string(),
            });
        }

        let created = ExternalConnection {
            id: Some(request.id.clone()),
            name: Some(request.name.clone()),
            description: request.description.clone(),
            connector_id: request.provisioning.map(|p| p.connector_id),
            ..ExternalConnection::default()
        };
        self.connections.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn delete_connection(&self, id: Option<&str>) -> Result<(), GraphError> {
        self.record(RegistryCall::Delete(id.map(str::to_string)));
        if let Some(id) = id {
            self.connections
                .lock()
                .unwrap()
                .retain(|c| c.id.as_deref() != Some(id));
        }
        Ok(())
    }

    async fn register_schema(&self, id: &str, schema: &JsonValue) -> Result<(), GraphError> {
        self.record(RegistryCall::RegisterSchema {
            id: id.to_string(),
            schema: schema.clone(),
        });
        Ok(())
    }
}
