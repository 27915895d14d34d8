//! Agent configuration
//!
//! The agent is configured from a YAML file. Every field has a default, so an
//! empty document yields an agent with id 1 reporting to `127.0.0.1:2210`.
//!
//! ```yaml
//! id: 7
//! ctrl_addr: 10.0.0.5
//! ctrl_port: 3000
//! transport:
//!   connect_timeout_ms: 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AgentIdentity, EnbId};

/// Default eNB identifier
pub const DEFAULT_AGENT_ID: EnbId = 1;
/// Default controller address
pub const DEFAULT_CTRL_ADDR: &str = "127.0.0.1";
/// Default controller port
pub const DEFAULT_CTRL_PORT: u16 = 2210;

/// Smallest accepted frame size: a `SliceReply` carrying a slice
/// configuration, the largest fixed-size message.
pub const MIN_FRAME_SIZE: usize = 107;

/// Transport tuning for the controller connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout for establishing the controller connection, in milliseconds
    pub connect_timeout_ms: u64,
    /// Largest accepted frame payload, in bytes
    pub max_frame_size: usize,
    /// Capacity of the outbound command queue between handle and session
    pub command_queue: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            max_frame_size: 65536,
            command_queue: 64,
        }
    }
}

impl TransportConfig {
    /// Returns the connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// eNB identifier
    #[serde(default = "default_id")]
    pub id: EnbId,
    /// Controller address
    #[serde(default = "default_ctrl_addr")]
    pub ctrl_addr: String,
    /// Controller port
    #[serde(default = "default_ctrl_port")]
    pub ctrl_port: u16,
    /// Transport tuning
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_id() -> EnbId {
    DEFAULT_AGENT_ID
}

fn default_ctrl_addr() -> String {
    DEFAULT_CTRL_ADDR.to_string()
}

fn default_ctrl_port() -> u16 {
    DEFAULT_CTRL_PORT
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_AGENT_ID,
            ctrl_addr: default_ctrl_addr(),
            ctrl_port: DEFAULT_CTRL_PORT,
            transport: TransportConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Creates a configuration with the given identity and default transport.
    pub fn new(id: EnbId, ctrl_addr: impl Into<String>, ctrl_port: u16) -> Self {
        Self {
            id,
            ctrl_addr: ctrl_addr.into(),
            ctrl_port,
            transport: TransportConfig::default(),
        }
    }

    /// Returns the identity part of the configuration.
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.id, self.ctrl_addr.clone(), self.ctrl_port)
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Controller address is empty
    #[error("Controller address must not be empty")]
    EmptyControllerAddress,

    /// Controller port is zero
    #[error("Controller port must be non-zero")]
    InvalidControllerPort,

    /// Transport settings out of range
    #[error("Invalid transport configuration: {0}")]
    InvalidTransport(String),
}

/// Loads an agent configuration from a YAML file.
pub fn load_agent_config<P: AsRef<Path>>(path: P) -> Result<AgentConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    load_agent_config_from_str(&contents)
}

/// Loads an agent configuration from a YAML string.
///
/// An empty document yields the default configuration.
pub fn load_agent_config_from_str(yaml: &str) -> Result<AgentConfig, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(AgentConfig::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

/// Validates an agent configuration.
///
/// # Validation Rules
///
/// - Controller address must not be empty
/// - Controller port must be non-zero
/// - Connect timeout must be non-zero
/// - Max frame size must fit every fixed-size message
/// - Command queue capacity must be non-zero
pub fn validate_agent_config(config: &AgentConfig) -> Result<(), ConfigValidationError> {
    if config.ctrl_addr.trim().is_empty() {
        return Err(ConfigValidationError::EmptyControllerAddress);
    }

    if config.ctrl_port == 0 {
        return Err(ConfigValidationError::InvalidControllerPort);
    }

    let transport = &config.transport;
    if transport.connect_timeout_ms == 0 {
        return Err(ConfigValidationError::InvalidTransport(
            "connect_timeout_ms must be non-zero".to_string(),
        ));
    }
    if transport.max_frame_size < MIN_FRAME_SIZE {
        return Err(ConfigValidationError::InvalidTransport(format!(
            "max_frame_size {} is smaller than the largest fixed-size message ({} bytes)",
            transport.max_frame_size, MIN_FRAME_SIZE
        )));
    }
    if transport.command_queue == 0 {
        return Err(ConfigValidationError::InvalidTransport(
            "command_queue must be non-zero".to_string(),
        ));
    }

    Ok(())
}

/// Loads and validates an agent configuration in one step.
pub fn load_and_validate_agent_config<P: AsRef<Path>>(path: P) -> Result<AgentConfig, ConfigError> {
    let config = load_agent_config(path)?;
    validate_agent_config(&config)?;
    Ok(config)
}
