//! Agent session
//!
//! The session task owns the controller connection once the agent is
//! started. It serves one inbound frame at a time:
//!
//! ```text
//! Controller --frame--> decode --> Dispatcher --> EventAck + outbox
//!                              \-> RanSliceController --> reply
//! ```
//!
//! Outbound messages from the agent handle arrive as `SessionCommand`s on
//! the task channel. A `TaskMessage::Shutdown` ends the loop even while the
//! controller is silent. The shutdown watch ends it even while a reply is
//! stuck on a controller that stopped reading.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use emage_common::{format_hex_dump, log_emage_message, Direction, EnbId};
use emage_proto::{codec, status, EmageMessage, EventAck, MessageBody};

use crate::dispatcher::{Dispatcher, Event, Outbox};
use crate::slice::RanSliceController;
use crate::tasks::{SessionCommand, Task, TaskMessage};
use crate::transport::{TransportError, TransportSession};
use crate::trigger::{TriggerKind, TriggerTable};

/// Lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unstarted,
    Starting,
    Connected,
    Locked,
    Terminating,
    Terminated,
}

impl SessionState {
    /// Identity changes are refused in every state but `Unstarted`.
    pub fn is_locked(self) -> bool {
        self != SessionState::Unstarted
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Starting => "starting",
            SessionState::Connected => "connected",
            SessionState::Locked => "locked",
            SessionState::Terminating => "terminating",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// State shared between the agent handle and its session task.
#[derive(Debug)]
pub(crate) struct AgentShared {
    pub dispatcher: Mutex<Dispatcher>,
    pub triggers: Mutex<TriggerTable>,
    pub slices: Mutex<RanSliceController>,
    connected: watch::Sender<bool>,
}

impl Default for AgentShared {
    fn default() -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            dispatcher: Mutex::default(),
            triggers: Mutex::default(),
            slices: Mutex::default(),
            connected,
        }
    }
}

impl AgentShared {
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    /// Watches the connection flag.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Dispatches a lifecycle event and returns its status and queued messages.
    pub fn dispatch(&self, event: &Event) -> (i32, Vec<MessageBody>) {
        let mut outbox = Outbox::new();
        let status = lock(&self.dispatcher).dispatch(event, &mut outbox);
        (status, outbox.into_messages())
    }

    /// Dispatches a controller request, installing its trigger when the
    /// handlers accept it.
    fn dispatch_request(&self, event: &Event) -> (i32, Vec<MessageBody>) {
        let trigger = match (event.trigger_id(), TriggerKind::for_event(event.kind())) {
            (Some(id), Some(kind)) if id >= 0 => Some((id, kind)),
            _ => None,
        };

        if let Some((id, _)) = trigger {
            if lock(&self.triggers).contains(id) {
                warn!("{} request reuses active trigger {}", event, id);
                return (status::ALREADY_EXISTS, Vec::new());
            }
        }

        let (mut result, messages) = self.dispatch(event);

        if let (status::OK, Some((id, kind))) = (result, trigger) {
            let module_id = event.module_id().unwrap_or_default();
            match lock(&self.triggers).install(id, kind, module_id) {
                Ok(_) => debug!("Installed {:?} trigger {}", kind, id),
                Err(e) => result = e.status(),
            }
        }

        (result, messages)
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once `true` is published on the shutdown watch. Pends forever
/// if the sender is gone.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Session task serving one controller connection
pub struct SessionTask<S> {
    enb_id: EnbId,
    transport: TransportSession<S>,
    shared: Arc<AgentShared>,
    shutdown: watch::Receiver<bool>,
    next_seq: u32,
}

impl<S> SessionTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        enb_id: EnbId,
        transport: TransportSession<S>,
        shared: Arc<AgentShared>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            enb_id,
            transport,
            shared,
            shutdown,
            next_seq: 1,
        }
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    async fn send(&mut self, seq: u32, body: MessageBody) -> Result<(), TransportError> {
        let msg = EmageMessage::new(self.enb_id, seq, body);
        let data = codec::encode(&msg);
        log_emage_message(Direction::Tx, &msg.message_type().to_string(), &data);

        let shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => Err(TransportError::Cancelled),
            result = self.transport.send_frame(data) => result,
        }
    }

    /// Sends `Hello` followed by the messages queued by INIT handlers.
    pub(crate) async fn announce(&mut self, queued: Vec<MessageBody>) -> Result<(), TransportError> {
        let seq = self.next_seq();
        self.send(seq, MessageBody::Hello).await?;
        for body in queued {
            let seq = self.next_seq();
            self.send(seq, body).await?;
        }
        Ok(())
    }

    /// Closes the transport without notifying handlers.
    pub(crate) async fn close(&mut self) {
        self.transport.disconnect().await;
    }

    /// Builds the replies to one inbound message, each with its sequence number.
    fn process(&mut self, msg: &EmageMessage) -> Vec<(u32, MessageBody)> {
        if let Some(event) = Event::from_request(&msg.body) {
            let (status, queued) = self.shared.dispatch_request(&event);
            let mut replies = Vec::with_capacity(queued.len() + 1);
            replies.push((
                msg.seq,
                MessageBody::EventAck(EventAck {
                    kind: event.kind(),
                    status,
                }),
            ));
            for body in queued {
                replies.push((self.next_seq(), body));
            }
            return replies;
        }

        if let Some(reply) = lock(&self.shared.slices).handle_request(&msg.body) {
            return vec![(msg.seq, reply)];
        }

        warn!("Ignoring unexpected {} from controller", msg.message_type());
        Vec::new()
    }

    async fn handle_frame(&mut self, frame: BytesMut) -> Result<(), TransportError> {
        let msg = match codec::decode(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed frame of {} bytes: {}", frame.len(), e);
                trace!("Frame:\n{}", format_hex_dump(&frame));
                return Ok(());
            }
        };
        log_emage_message(Direction::Rx, &msg.message_type().to_string(), &frame);

        if msg.enb_id != self.enb_id {
            warn!(
                "Dropping {} addressed to eNB {} (this is eNB {})",
                msg.message_type(),
                msg.enb_id,
                self.enb_id
            );
            return Ok(());
        }

        for (seq, body) in self.process(&msg) {
            self.send(seq, body).await?;
        }
        Ok(())
    }

    /// Tears the connection down after a transport failure or peer close
    /// and notifies DISCONNECTED handlers once.
    async fn connection_lost(&mut self) {
        if !self.transport.is_connected() {
            return;
        }
        self.transport.disconnect().await;
        self.shared.set_connected(false);

        let (status, queued) = self.shared.dispatch(&Event::Disconnected);
        if !queued.is_empty() {
            debug!("Discarding {} messages queued while disconnected", queued.len());
        }
        info!("Controller connection lost (DISCONNECTED status {})", status);
    }
}

#[async_trait::async_trait]
impl<S> Task for SessionTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Message = SessionCommand;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!("Session task started (eNB {}, controller {})", self.enb_id, self.transport.peer());

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(TaskMessage::Message(SessionCommand::Send(body))) => {
                            if !self.transport.is_connected() {
                                debug!("Dropping {}: not connected", body.message_type());
                                continue;
                            }
                            let seq = self.next_seq();
                            match self.send(seq, body).await {
                                Ok(()) => {}
                                Err(TransportError::Cancelled) => break,
                                Err(e) => {
                                    error!("Failed to send to controller: {}", e);
                                    self.connection_lost().await;
                                }
                            }
                        }
                        Some(TaskMessage::Shutdown) => {
                            info!("Session task received shutdown signal");
                            break;
                        }
                        None => {
                            info!("Session task channel closed");
                            break;
                        }
                    }
                }

                _ = shutdown_requested(self.shutdown.clone()) => {
                    info!("Session task received shutdown signal");
                    break;
                }

                frame = self.transport.recv_frame(), if self.transport.is_connected() => {
                    match frame {
                        Some(Ok(frame)) => match self.handle_frame(frame).await {
                            Ok(()) => {}
                            Err(TransportError::Cancelled) => {
                                info!("Shutdown interrupted a pending reply");
                                break;
                            }
                            Err(e) => {
                                error!("Failed to reply to controller: {}", e);
                                self.connection_lost().await;
                            }
                        },
                        Some(Err(e)) => {
                            error!("Controller transport error: {}", e);
                            self.connection_lost().await;
                        }
                        None => {
                            info!("Controller closed the connection");
                            self.connection_lost().await;
                        }
                    }
                }
            }
        }

        self.transport.disconnect().await;
        self.shared.set_connected(false);
        info!("Session task stopped");
    }
}
