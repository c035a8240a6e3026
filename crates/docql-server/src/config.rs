//! Configuration for the DocQL server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, schema file, discovery, logging)
//! 2. .env file - loaded into the environment by `main`
//!
//! Environment variables always override config.yaml values.

use std::path::Path;

use docql_discover::DiscoveryConfig;
use docql_n1ql::CompilerOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where the discovered schema is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub path: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: "./schema.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub compiler: CompilerOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Like [`Config::load`], falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.apply_env_overrides()?;
        config
            .discovery
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("DOCQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DOCQL_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("DOCQL_SERVER_PORT={}", port)))?;
        }
        if let Ok(path) = std::env::var("DOCQL_SCHEMA_PATH") {
            self.schema.path = path;
        }
        if let Ok(size) = std::env::var("DOCQL_SAMPLE_SIZE") {
            self.discovery.sample_size = size
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("DOCQL_SAMPLE_SIZE={}", size)))?;
        }
        if let Ok(list) = std::env::var("DOCQL_TYPE_NAME_LIST") {
            self.discovery.type_name_list = Some(list);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schema.path, "./schema.json");
        assert_eq!(config.discovery.sample_size, 100);
        assert!(config.compiler.offset_requires_limit);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
discovery:
  sample_size: 25
  type_name_list: "`test`:`type`"
compiler:
  offset_requires_limit: false
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.discovery.sample_size, 25);
        assert_eq!(config.discovery.type_names().get("test"), Some("type"));
        assert!(!config.compiler.offset_requires_limit);
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("DOCQL_SERVER_PORT", "9090");
        std::env::set_var("DOCQL_SCHEMA_PATH", "/tmp/docql-schema.json");

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "server:\n  host: \"0.0.0.0\"\n  port: 8080\nschema:\n  path: \"./schema.json\"\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.schema.path, "/tmp/docql-schema.json");

        std::env::remove_var("DOCQL_SERVER_PORT");
        std::env::remove_var("DOCQL_SCHEMA_PATH");
    }

    #[test]
    fn test_zero_sample_size_rejected() {
        let err = Config::from_yaml("discovery:\n  sample_size: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
