//! Common types and utilities for emage
//!
//! This crate provides the logging setup, configuration structures and
//! identity types shared by all emage crates.

pub mod config;
pub mod logging;
pub mod types;

pub use config::{
    load_agent_config, load_agent_config_from_str, load_and_validate_agent_config,
    validate_agent_config, AgentConfig, ConfigError, ConfigValidationError, TransportConfig,
    DEFAULT_AGENT_ID, DEFAULT_CTRL_ADDR, DEFAULT_CTRL_PORT, MIN_FRAME_SIZE,
};
pub use logging::{
    format_hex_dump, init_logging, init_logging_with_filter, log_emage_message,
    log_protocol_message, Direction, HexDump, LogLevel,
};
pub use types::{AgentIdentity, CellId, EnbId, ModuleId, Rnti, SliceId, TriggerId};
