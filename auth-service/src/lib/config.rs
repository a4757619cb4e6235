use std::env;
use std::time::Duration;

use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    pub tokens: TokenConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    pub secret: String,
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownConfig {
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_access_ttl_secs() -> u64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    60 * 60
}

fn default_max_connections() -> u32 {
    5
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_purge_interval_secs() -> u64 {
    60
}

fn default_grace_period_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (TOKENS__SECRET, STORAGE__BACKEND, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: STORAGE__DATABASE_URL=postgres://... overrides storage.database_url
            .add_source(Environment::with_prefix("").separator("__"))
            .build()?;

        configuration.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

impl StorageConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn parse(toml: &str) -> Result<Config, ConfigError> {
        ConfigBuilder::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config = parse(
            r#"
            [tokens]
            secret = "a-string-secret-at-least-256-bits-long"

            [storage]
            backend = "memory"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.environment, "development");
        assert!(!config.is_production());
        assert_eq!(config.tokens.access_ttl(), Duration::from_secs(900));
        assert_eq!(config.tokens.refresh_ttl(), Duration::from_secs(3600));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.database_url, None);
        assert_eq!(config.storage.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_postgres_backend() {
        let config = parse(
            r#"
            environment = "production"

            [tokens]
            secret = "a-string-secret-at-least-256-bits-long"
            access_ttl_secs = 60
            refresh_ttl_secs = 600

            [storage]
            backend = "postgres"
            database_url = "postgresql://localhost/auth"
            max_connections = 10
            "#,
        )
        .expect("config should parse");

        assert!(config.is_production());
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(
            config.storage.database_url.as_deref(),
            Some("postgresql://localhost/auth")
        );
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.tokens.access_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = parse(
            r#"
            [tokens]
            secret = "a-string-secret-at-least-256-bits-long"

            [storage]
            backend = "cassandra"
            "#,
        );

        assert!(result.is_err());
    }
}
