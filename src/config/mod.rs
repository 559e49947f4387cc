//! Configuration loading for the Graph connector.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GRAPH_CONNECTOR_`, producing a typed [`AppConfig`]. Every required value
//! is checked before the loader returns, so a process never starts half
//! configured.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by every environment key this service reads.
pub const ENV_PREFIX: &str = "GRAPH_CONNECTOR_";

/// Application configuration derived from `GRAPH_CONNECTOR_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Application (client) id; also the audience accepted on notification tokens.
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
    pub github_owner: String,
    pub github_repo: String,
    pub github_token: String,
    /// Directory user credited for activities pushed on behalf of GitHub users.
    pub placeholder_user_id: String,
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            bind_host: default_bind_host(),
            port: 3978,
            log_level: default_log_level(),
            log_format: default_log_format(),
            client_id: String::new(),
            tenant_id: String::new(),
            client_secret: String::new(),
            github_owner: String::new(),
            github_repo: String::new(),
            github_token: String::new(),
            placeholder_user_id: String::new(),
            graph_api_base: default_graph_api_base(),
            authority_host: default_authority_host(),
            jwks_url: default_jwks_url(),
            github_api_base: default_github_api_base(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_host, self.port).parse()
    }

    /// Issuers accepted on notification validation tokens: the v2 endpoint
    /// and the legacy security token service form, both scoped to the tenant.
    pub fn accepted_issuers(&self) -> Vec<String> {
        vec![
            format!("https://login.microsoftonline.com/{}/v2.0", self.tenant_id),
            format!("https://sts.windows.net/{}/", self.tenant_id),
        ]
    }

    /// Token endpoint used for the client credentials grant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        config.client_secret = "[REDACTED]".to_string();
        config.github_token = "[REDACTED]".to_string();
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("CLIENT_ID", &self.client_id),
            ("TENANT_ID", &self.tenant_id),
            ("CLIENT_SECRET", &self.client_secret),
            ("GITHUB_OWNER", &self.github_owner),
            ("GITHUB_REPO", &self.github_repo),
            ("GITHUB_TOKEN", &self.github_token),
            ("PLACEHOLDER_USER_ID", &self.placeholder_user_id),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing {
                    key: format!("{ENV_PREFIX}{key}"),
                });
            }
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_jwks_url() -> String {
    "https://login.microsoftonline.com/common/discovery/v2.0/keys".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("required setting {key} is missing")]
    Missing { key: String },
    #[error("invalid port '{value}': {source}")]
    InvalidPort {
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Loads configuration using layered `.env` files and `GRAPH_CONNECTOR_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration. Fails on the first missing required value.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let port_raw = take("PORT").ok_or_else(|| ConfigError::Missing {
            key: format!("{ENV_PREFIX}PORT"),
        })?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|source| ConfigError::InvalidPort {
                value: port_raw.clone(),
                source,
            })?;

        let config = AppConfig {
            profile,
            bind_host: take("BIND_HOST").unwrap_or_else(default_bind_host),
            port,
            log_level: take("LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: take("LOG_FORMAT").unwrap_or_else(default_log_format),
            client_id: take("CLIENT_ID").unwrap_or_default(),
            tenant_id: take("TENANT_ID").unwrap_or_default(),
            client_secret: take("CLIENT_SECRET").unwrap_or_default(),
            github_owner: take("GITHUB_OWNER").unwrap_or_default(),
            github_repo: take("GITHUB_REPO").unwrap_or_default(),
            github_token: take("GITHUB_TOKEN").unwrap_or_default(),
            placeholder_user_id: take("PLACEHOLDER_USER_ID").unwrap_or_default(),
            graph_api_base: take("GRAPH_API_BASE").unwrap_or_else(default_graph_api_base),
            authority_host: take("AUTHORITY_HOST").unwrap_or_else(default_authority_host),
            jwks_url: take("JWKS_URL").unwrap_or_else(default_jwks_url),
            github_api_base: take("GITHUB_API_BASE").unwrap_or_else(default_github_api_base),
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: format!("{}:{}", config.bind_host, config.port),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
