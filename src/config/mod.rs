pub mod validation;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub use_env_proxy: bool,
}

fn default_timeout_secs() -> u64 {
    600
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl ClientConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            use_env_proxy: false,
        }
    }
}

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

/// Pacing parameters for streamed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Soft upper bound, in bytes, of one chunk handed to the sink.
    #[serde(default = "default_chunk_cap")]
    pub chunk_cap: usize,
    /// Delay between two flushes of the pending buffer.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_chunk_cap() -> usize {
    64
}
fn default_interval_ms() -> u64 {
    100
}

/// Widest UTF-8 character; a smaller cap could never hold one.
pub const MIN_CHUNK_CAP: usize = 4;

impl StreamConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a cap below [`MIN_CHUNK_CAP`]
    /// or a zero interval.
    pub fn new(chunk_cap: usize, interval_ms: u64) -> Result<Self, ConfigError> {
        let config = Self {
            chunk_cap,
            interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Same as [`StreamConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_cap < MIN_CHUNK_CAP {
            return Err(ConfigError::Validation(format!(
                "stream.chunk_cap must be at least {MIN_CHUNK_CAP}"
            )));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "stream.interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Tick period, never shorter than one millisecond.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_cap: default_chunk_cap(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// JSON API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
