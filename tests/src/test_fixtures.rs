//! Test fixtures and configuration helpers

use std::sync::Mutex;

use tokio::net::TcpStream;

use emage_agent::{Connector, TcpConnector, TransportError};
use emage_common::{AgentConfig, EnbId, Rnti};
use emage_proto::{RanL2Config, RanSliceConfig};

/// Agent configuration pointing at a local mock controller
pub fn agent_config(id: EnbId, ctrl_port: u16) -> AgentConfig {
    let mut config = AgentConfig::new(id, "127.0.0.1", ctrl_port);
    config.transport.connect_timeout_ms = 1000;
    config
}

/// Consistent slice configuration for the given users
pub fn slice_config(users: Vec<Rnti>) -> RanSliceConfig {
    RanSliceConfig::new(
        users,
        RanL2Config {
            user_sched: 1,
            rbg: 6,
        },
    )
}

/// Records every requested endpoint and connects to a local port instead.
///
/// Lets tests use production-looking controller addresses.
pub struct RedirectConnector {
    target_port: u16,
    inner: TcpConnector,
    requested: Mutex<Vec<String>>,
}

impl RedirectConnector {
    pub fn new(target_port: u16) -> Self {
        Self {
            target_port,
            inner: TcpConnector::default(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Endpoints the agent asked for, in order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Connector for RedirectConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str, port: u16) -> Result<TcpStream, TransportError> {
        self.requested.lock().unwrap().push(format!("{addr}:{port}"));
        self.inner.connect("127.0.0.1", self.target_port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_config_is_consistent() {
        let config = slice_config(vec![5, 9]);
        assert_eq!(config.nof_users, 2);
        assert_eq!(config.l2.rbg, 6);
    }

    #[test]
    fn test_agent_config() {
        let config = agent_config(7, 4000);
        assert_eq!(config.identity().controller_endpoint(), "127.0.0.1:4000");
        assert_eq!(config.transport.connect_timeout_ms, 1000);
    }
}
