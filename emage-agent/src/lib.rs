//! emage-agent - eNB agent control protocol engine
//!
//! This crate keeps a base-station agent connected to its SDN controller.
//! It implements:
//!
//! - The controller transport (length-prefixed frames over a byte stream)
//! - Event dispatch of controller requests to registered handlers
//! - Trigger bookkeeping for periodic reports
//! - RAN slice configuration (add/conf/remove)
//! - The agent lifecycle (start, locked identity, terminate)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Agent                      │
//! │  identity ─ state ─ Dispatcher ─ Triggers     │
//! │        │                    RanSliceController│
//! │        │ SessionCommand                       │
//! │  ┌─────┴──────┐                               │
//! │  │  Session   │                               │
//! │  │   Task     │                               │
//! │  └─────┬──────┘                               │
//! └────────┼─────────────────────────────────────┘
//!          ▼
//!      Controller
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use emage_agent::{Agent, EventKind};
//! use emage_common::AgentConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut agent = Agent::new(AgentConfig::new(7, "10.0.0.5", 3000));
//!     agent.register_fn(EventKind::Init, |_, _| Ok(()));
//!     agent.start().await.unwrap();
//!     // ...
//!     agent.terminate().await.unwrap();
//! }
//! ```

pub mod agent;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod slice;
pub mod tasks;
pub mod transport;
pub mod trigger;

pub use agent::{Agent, AgentResult};
pub use dispatcher::{
    AgentOps, Dispatcher, Event, EventHandler, HandlerError, HandlerResult, Outbox,
};
pub use error::{status_of, AgentError, StateError};
pub use session::{SessionState, SessionTask};
pub use slice::{NullRanBackend, RanBackend, RanSliceController, SliceError};
pub use tasks::{SessionCommand, Task, TaskMessage};
pub use transport::{Connector, TcpConnector, TransportError, TransportSession};
pub use trigger::{Trigger, TriggerError, TriggerKind, TriggerTable};

pub use emage_proto::{status, EventKind};
