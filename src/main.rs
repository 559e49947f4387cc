//! # Graph Connector Main Entry Point
//!
//! Runs the lifecycle notification receiver, or one administrative command
//! against the connection registry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use graph_connector::{
    config::{AppConfig, ConfigLoader},
    dispatcher::NotificationDispatcher,
    github::GitHubClient,
    graph::{GraphClient, schema},
    registry::{ConnectionRegistry, ContentType, NewConnection},
    server::{AppState, run_server},
    sync_executor::SyncExecutor,
    telemetry::init_tracing,
    webhook_verification::TokenValidator,
};
use tracing::info;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "graph-connector")]
#[command(author, version, about = "GitHub connector for enterprise search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the connector lifecycle notification receiver
    Serve,

    /// Manage external connections
    Connections {
        #[command(subcommand)]
        command: ConnectionCommands,
    },

    /// Manage connection schemas
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Push GitHub content into a connection
    Push {
        #[arg(long)]
        connection_id: String,

        #[arg(long, value_enum)]
        content_type: ContentType,
    },
}

#[derive(Subcommand)]
enum ConnectionCommands {
    /// List every connection
    List,

    /// Create a connection
    Create {
        /// 3-32 alphanumeric characters
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long, value_enum)]
        content_type: ContentType,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a connection
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Register the schema for a content type and wait for provisioning
    Register {
        #[arg(long)]
        connection_id: String,

        #[arg(long, value_enum)]
        content_type: ContentType,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    init_tracing(&config).context("initializing tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let http_client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    match cli.command {
        Commands::Serve => serve(config, http_client).await,
        Commands::Connections { command } => {
            let graph = GraphClient::from_config(&config, http_client);
            run_connection_command(&graph, command).await
        }
        Commands::Schema {
            command:
                SchemaCommands::Register {
                    connection_id,
                    content_type,
                },
        } => {
            let graph = GraphClient::from_config(&config, http_client);
            graph
                .register_schema(&connection_id, &schema::schema_for(content_type))
                .await
                .with_context(|| {
                    format!("registering {} schema on {}", content_type, connection_id)
                })?;
            println!("Schema registered on {}", connection_id);
            Ok(())
        }
        Commands::Push {
            connection_id,
            content_type,
        } => {
            let executor = SyncExecutor::new(
                GitHubClient::from_config(&config, http_client.clone()),
                GraphClient::from_config(&config, http_client),
                config.placeholder_user_id.clone(),
            );
            let report = executor
                .push(&connection_id, content_type)
                .await
                .with_context(|| format!("pushing {} into {}", content_type, connection_id))?;
            println!(
                "Pushed {} {} item(s) into {} ({} failed)",
                report.pushed, content_type, connection_id, report.failed
            );
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, http_client: reqwest::Client) -> Result<()> {
    let validator = Arc::new(TokenValidator::from_config(&config, http_client.clone()));
    let registry = Arc::new(GraphClient::from_config(&config, http_client));
    let state = AppState {
        config: Arc::new(config),
        dispatcher: NotificationDispatcher::new(validator, registry),
    };

    run_server(state)
        .await
        .map_err(|e| anyhow!("server error: {}", e))
}

async fn run_connection_command(graph: &GraphClient, command: ConnectionCommands) -> Result<()> {
    match command {
        ConnectionCommands::List => {
            let connections = graph.list_connections().await.context("listing connections")?;
            if connections.is_empty() {
                println!("No connections");
            }
            for connection in connections {
                println!(
                    "{}\t{}\t{}",
                    connection.id.as_deref().unwrap_or("-"),
                    connection.name.as_deref().unwrap_or("-"),
                    connection.state.as_deref().unwrap_or("-")
                );
            }
        }
        ConnectionCommands::Create {
            id,
            name,
            content_type,
            description,
        } => {
            let request =
                NewConnection::new(id.clone(), name, content_type).with_description(description);
            graph
                .create_connection(request)
                .await
                .with_context(|| format!("creating connection {}", id))?;
            println!("Created connection {}", id);
        }
        ConnectionCommands::Delete { id } => {
            graph
                .delete_connection(Some(&id))
                .await
                .with_context(|| format!("deleting connection {}", id))?;
            println!("Deleted connection {}", id);
        }
    }
    Ok(())
}
