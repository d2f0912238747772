//! Server configuration
//!
//! Sources, lowest priority first: built-in defaults, `config/default`,
//! `config/local`, the `--config` file, `GATEHOUSE__*` environment
//! variables. CLI flags are applied on top by `main`.

use std::net::SocketAddr;

use anyhow::Context;
use config::{builder::DefaultState, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use gatehouse_api::ApiConfig;
use gatehouse_auth::AuthConfig;
use gatehouse_db::DatabaseConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub storage: StorageKind,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub maintenance: MaintenanceConfig,
}

/// Where credentials live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// PostgreSQL + Redis
    #[default]
    Postgres,
    /// Process memory; state is lost on restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Background housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Sign-in history partitions older than this many years are dropped
    pub history_retention_years: i32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            history_retention_years: 1,
        }
    }
}

impl ServerConfig {
    /// Load from `.env`, config files and the environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("GATEHOUSE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("api.cors_origins")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.auth.rate_limit.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml = r#"
            storage = "memory"

            [server]
            port = 9000

            [auth.jwt]
            access_secret = "from-file-access-secret-at-least-32-bytes"
            access_token_lifetime = "5m"

            [auth.rate_limit.login]
            limit = 3
            window = "10s"
        "#;
        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = ServerConfig::from_builder(builder).unwrap();

        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt.access_token_lifetime, Duration::from_secs(300));
        assert_eq!(config.auth.rate_limit.login.limit, 3);
        assert_eq!(config.auth.rate_limit.refresh.limit, 10);
    }

    #[test]
    fn test_socket_addr() {
        let settings = ServerSettings::default();
        assert_eq!(settings.socket_addr().unwrap().port(), 8000);

        let bad = ServerSettings {
            host: "not a host".into(),
            ..ServerSettings::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
