//! Agent error types

use thiserror::Error;

use emage_common::{ConfigValidationError, TriggerId};
use emage_proto::status;

use crate::transport::TransportError;

/// Lifecycle misuse. Returned synchronously, nothing is changed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("Agent is already started")]
    AlreadyStarted,
    #[error("Agent identity is locked while the session runs")]
    Locked,
    #[error("Agent is not connected to a controller")]
    NotConnected,
}

impl StateError {
    pub fn status(&self) -> i32 {
        match self {
            StateError::AlreadyStarted => status::ALREADY_STARTED,
            StateError::Locked => status::LOCKED,
            StateError::NotConnected => status::NOT_CONNECTED,
        }
    }
}

/// Errors returned by the agent handle
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),

    /// INIT handlers refused the session
    #[error("Initialization rejected by handlers (status {0})")]
    InitRejected(i32),

    #[error("Trigger {0} is not active")]
    TriggerNotFound(TriggerId),

    #[error("Report payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
}

impl AgentError {
    /// Integer status for this error, never zero
    pub fn status(&self) -> i32 {
        match self {
            AgentError::State(e) => e.status(),
            AgentError::Transport(e) => e.status(),
            AgentError::Config(_) => status::INVALID,
            AgentError::InitRejected(code) if *code != status::OK => *code,
            AgentError::InitRejected(_) => status::GENERIC,
            AgentError::TriggerNotFound(_) => status::NOT_FOUND,
            AgentError::PayloadTooLarge(_) => status::INVALID,
        }
    }
}

/// Maps a lifecycle outcome to its integer status (0 on success).
pub fn status_of<T>(result: &Result<T, AgentError>) -> i32 {
    match result {
        Ok(_) => status::OK,
        Err(e) => e.status(),
    }
}
