//! Agent handle
//!
//! [`Agent`] is the owner-facing side of the engine: it holds the identity,
//! the handler registry and the lifecycle state, and runs the session task
//! once started.
//!
//! ```text
//! Unstarted --start()--> Starting --INIT ack--> Connected --> Locked
//! Locked --terminate()--> Terminating --> Terminated --> Unstarted
//! ```

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use emage_common::{
    validate_agent_config, AgentConfig, AgentIdentity, EnbId, ModuleId, SliceId, TriggerId,
};
use emage_proto::{status, EventKind, MessageBody, RanSliceConfig, Report, MAX_REPORT_PAYLOAD};

use crate::dispatcher::{AgentOps, Event, EventHandler, HandlerResult, Outbox};
use crate::error::{AgentError, StateError};
use crate::session::{lock, AgentShared, SessionState, SessionTask};
use crate::slice::RanBackend;
use crate::tasks::{SessionCommand, Task, TaskMessage};
use crate::transport::{Connector, TcpConnector, TransportSession};
use crate::trigger::{Trigger, TriggerKind};

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// A base-station agent and its controller session.
pub struct Agent<C: Connector = TcpConnector> {
    config: AgentConfig,
    connector: C,
    state: SessionState,
    shared: Arc<AgentShared>,
    session: Option<RunningSession>,
}

struct RunningSession {
    tx: mpsc::Sender<TaskMessage<SessionCommand>>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Agent<TcpConnector> {
    /// Creates an agent that reaches its controller over TCP.
    pub fn new(config: AgentConfig) -> Self {
        let connector = TcpConnector::new(config.transport.connect_timeout());
        Self::with_connector(config, connector)
    }
}

impl Default for Agent<TcpConnector> {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}

impl<C: Connector> Agent<C> {
    /// Creates an agent using a custom connector.
    pub fn with_connector(config: AgentConfig, connector: C) -> Self {
        let shared = AgentShared::default();
        lock(&shared.triggers).reset(config.id);
        Self {
            config,
            connector,
            state: SessionState::Unstarted,
            shared: Arc::new(shared),
            session: None,
        }
    }

    pub fn id(&self) -> EnbId {
        self.config.id
    }

    pub fn ctrl_addr(&self) -> &str {
        &self.config.ctrl_addr
    }

    pub fn ctrl_port(&self) -> u16 {
        self.config.ctrl_port
    }

    pub fn identity(&self) -> AgentIdentity {
        self.config.identity()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while the controller connection is up
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Waits until the controller connection is down. Returns at once on an
    /// agent that is not connected.
    pub async fn disconnected(&self) {
        let mut connected = self.shared.subscribe_connected();
        // The sender lives in `self.shared`, so this only ends on `false`
        let _ = connected.wait_for(|up| !*up).await;
    }

    fn ensure_unlocked(&self) -> Result<(), StateError> {
        if self.state.is_locked() {
            return Err(StateError::Locked);
        }
        Ok(())
    }

    /// Changes the eNB id. Refused once the agent is started.
    pub fn set_id(&mut self, id: EnbId) -> Result<(), StateError> {
        self.ensure_unlocked()?;
        self.config.id = id;
        lock(&self.shared.triggers).reset(id);
        Ok(())
    }

    /// Changes the controller address. Refused once the agent is started.
    pub fn set_ctrl_addr(&mut self, addr: impl Into<String>) -> Result<(), StateError> {
        self.ensure_unlocked()?;
        self.config.ctrl_addr = addr.into();
        Ok(())
    }

    /// Changes the controller port. Refused once the agent is started.
    pub fn set_ctrl_port(&mut self, port: u16) -> Result<(), StateError> {
        self.ensure_unlocked()?;
        self.config.ctrl_port = port;
        Ok(())
    }

    /// Appends handlers for `kind`, keeping their order.
    pub fn register_to<I>(&self, kind: EventKind, handlers: I)
    where
        I: IntoIterator<Item = Box<dyn EventHandler>>,
    {
        let mut dispatcher = lock(&self.shared.dispatcher);
        for handler in handlers {
            dispatcher.register(kind, handler);
        }
    }

    /// Appends a closure handler for `kind`.
    pub fn register_fn<F>(&self, kind: EventKind, f: F)
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        lock(&self.shared.dispatcher).register_fn(kind, f);
    }

    /// Wires a capability set into every event kind.
    pub fn register_ops<O: AgentOps>(&self, ops: O) -> Arc<Mutex<O>> {
        lock(&self.shared.dispatcher).register_ops(ops)
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        lock(&self.shared.dispatcher).handler_count(kind)
    }

    pub fn has_trigger(&self, id: TriggerId) -> bool {
        lock(&self.shared.triggers).contains(id)
    }

    /// True if `id` is an active trigger of the given kind
    pub fn has_trigger_of(&self, id: TriggerId, kind: TriggerKind) -> bool {
        lock(&self.shared.triggers).contains_kind(id, kind)
    }

    pub fn trigger(&self, id: TriggerId) -> Option<Trigger> {
        lock(&self.shared.triggers).get(id).copied()
    }

    /// Removes a trigger. Returns false if it was not active.
    pub fn del_trigger(&self, id: TriggerId) -> bool {
        let removed = lock(&self.shared.triggers).remove(id).is_some();
        if removed {
            debug!("Trigger {} removed", id);
        }
        removed
    }

    /// Replaces the scheduler backend used by the slice controller.
    pub fn set_ran_backend<B: RanBackend + 'static>(&self, backend: B) {
        lock(&self.shared.slices).set_backend(Box::new(backend));
    }

    /// Current configuration of a slice, if any
    pub fn slice_config(&self, module_id: ModuleId, slice_id: SliceId) -> Option<RanSliceConfig> {
        lock(&self.shared.slices)
            .slice_request(module_id, slice_id)
            .ok()
            .cloned()
    }

    /// Connects to the controller, runs INIT handlers, announces the agent
    /// and starts the session task. The identity is locked from here on.
    pub async fn start(&mut self) -> AgentResult<()> {
        if self.state != SessionState::Unstarted {
            return Err(StateError::AlreadyStarted.into());
        }
        validate_agent_config(&self.config)?;
        self.state = SessionState::Starting;
        info!("Starting agent: {}", self.config.identity());

        let transport = match TransportSession::connect(
            &self.connector,
            &self.config.ctrl_addr,
            self.config.ctrl_port,
            self.config.transport.max_frame_size,
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Failed to connect to controller: {}", e);
                self.state = SessionState::Unstarted;
                return Err(e.into());
            }
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut task = SessionTask::new(
            self.config.id,
            transport,
            Arc::clone(&self.shared),
            shutdown_rx,
        );

        lock(&self.shared.triggers).reset(self.config.id);
        let (init_status, queued) = self.shared.dispatch(&Event::Init);
        if init_status != status::OK {
            warn!("INIT handlers failed (status {}), aborting start", init_status);
            task.close().await;
            self.state = SessionState::Unstarted;
            return Err(AgentError::InitRejected(init_status));
        }
        self.state = SessionState::Connected;

        if let Err(e) = task.announce(queued).await {
            warn!("Failed to announce agent: {}", e);
            task.close().await;
            self.state = SessionState::Unstarted;
            return Err(e.into());
        }
        self.shared.set_connected(true);

        let (tx, rx) = mpsc::channel(self.config.transport.command_queue);
        let handle = tokio::spawn(async move {
            task.run(rx).await;
        });
        self.session = Some(RunningSession {
            tx,
            shutdown,
            handle,
        });
        self.state = SessionState::Locked;

        info!("Agent {} started", self.config.id);
        Ok(())
    }

    /// Stops the session, runs RELEASE handlers and unlocks the identity.
    /// A no-op on an agent that is not started.
    pub async fn terminate(&mut self) -> AgentResult<()> {
        let Some(session) = self.session.take() else {
            debug!("Terminate on an agent that is not running");
            return Ok(());
        };
        self.state = SessionState::Terminating;
        info!("Terminating agent {}", self.config.id);

        // The watch reaches the task even while it is stuck writing to the
        // controller or its command queue is full
        session.shutdown.send_replace(true);
        if session.tx.try_send(TaskMessage::shutdown()).is_err() {
            debug!("Session command queue unavailable, relying on shutdown watch");
        }
        if let Err(e) = session.handle.await {
            warn!("Session task ended abnormally: {}", e);
        }
        self.state = SessionState::Terminated;
        self.shared.set_connected(false);

        let (release_status, _) = self.shared.dispatch(&Event::Release);
        if release_status != status::OK {
            warn!("RELEASE handlers failed (status {})", release_status);
        }
        lock(&self.shared.triggers).clear();

        self.state = SessionState::Unstarted;
        info!("Agent {} terminated", self.config.id);
        Ok(())
    }

    /// Queues a message for the controller.
    pub async fn send(&self, body: MessageBody) -> AgentResult<()> {
        let session = match &self.session {
            Some(session) if self.is_connected() => session,
            _ => return Err(StateError::NotConnected.into()),
        };
        session
            .tx
            .send(TaskMessage::message(SessionCommand::Send(body)))
            .await
            .map_err(|_| StateError::NotConnected)?;
        Ok(())
    }

    /// Sends a report on behalf of an active trigger.
    pub async fn report(&self, trigger_id: TriggerId, payload: impl Into<Bytes>) -> AgentResult<()> {
        if !self.has_trigger(trigger_id) {
            return Err(AgentError::TriggerNotFound(trigger_id));
        }
        let payload = payload.into();
        if payload.len() > MAX_REPORT_PAYLOAD {
            return Err(AgentError::PayloadTooLarge(payload.len()));
        }
        self.send(MessageBody::Report(Report {
            trigger_id,
            payload,
        }))
        .await
    }
}

impl<C: Connector> Drop for Agent<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown.send_replace(true);
            session.handle.abort();
        }
    }
}
