//! Identity types shared between the agent and its controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// eNB (agent) identifier.
pub type EnbId = u64;

/// Base-station module identifier carried by controller requests.
pub type ModuleId = u32;

/// Cell identifier.
pub type CellId = u16;

/// Radio network temporary identifier of a UE.
pub type Rnti = u16;

/// Trigger identifier. Negative values denote one-shot requests.
pub type TriggerId = i32;

/// RAN slice identifier.
pub type SliceId = u64;

/// Identity of an agent and the controller it reports to.
///
/// The identity can only be changed while the agent is not running; the
/// agent handle enforces that through its session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// eNB identifier announced to the controller
    pub id: EnbId,
    /// Controller address (IP literal or host name)
    pub ctrl_addr: String,
    /// Controller TCP port
    pub ctrl_port: u16,
}

impl AgentIdentity {
    /// Creates a new identity.
    pub fn new(id: EnbId, ctrl_addr: impl Into<String>, ctrl_port: u16) -> Self {
        Self {
            id,
            ctrl_addr: ctrl_addr.into(),
            ctrl_port,
        }
    }

    /// Returns the controller endpoint as `addr:port`.
    ///
    /// IPv6 literals are wrapped in brackets.
    pub fn controller_endpoint(&self) -> String {
        if self.ctrl_addr.contains(':') && !self.ctrl_addr.starts_with('[') {
            format!("[{}]:{}", self.ctrl_addr, self.ctrl_port)
        } else {
            format!("{}:{}", self.ctrl_addr, self.ctrl_port)
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eNB {} -> {}", self.id, self.controller_endpoint())
    }
}
