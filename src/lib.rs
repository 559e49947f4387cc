//! # Graph Connector Library
//!
//! Connector lifecycle handling for an enterprise search platform: a webhook
//! receiver that validates notification tokens and creates or deletes
//! connections, a registry client for connections and schemas, and a content
//! push from GitHub into a connection.

pub mod config;
pub mod dispatcher;
pub mod github;
pub mod graph;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod render;
pub mod server;
pub mod sync_executor;
pub mod telemetry;
pub mod webhook_verification;
