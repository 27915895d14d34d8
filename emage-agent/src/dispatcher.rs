//! Event dispatcher
//!
//! Controller requests and lifecycle transitions are turned into [`Event`]s
//! and fanned out to the handlers registered for their [`EventKind`].
//! Handlers run synchronously in registration order. A failing or panicking
//! handler never stops the ones after it; the dispatch status is the code of
//! the first failure.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use emage_common::{CellId, ModuleId, TriggerId};
use emage_proto::{
    status, CellMeasure, EventKind, HandoverUe, MessageBody, Report, UeMeasure, MAX_REPORT_PAYLOAD,
};

/// An event delivered to handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Controller connection is up, before the agent says hello
    Init,
    /// Agent is being terminated
    Release,
    /// Controller connection was lost
    Disconnected,
    CellSetupRequest { cell_id: CellId },
    EnbSetupRequest { module_id: ModuleId },
    UeReport { module_id: ModuleId, trigger_id: TriggerId },
    UeMeasure(UeMeasure),
    HandoverUe(HandoverUe),
    CellMeasure(CellMeasure),
}

impl Event {
    /// Returns the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Init => EventKind::Init,
            Event::Release => EventKind::Release,
            Event::Disconnected => EventKind::Disconnected,
            Event::CellSetupRequest { .. } => EventKind::CellSetupRequest,
            Event::EnbSetupRequest { .. } => EventKind::EnbSetupRequest,
            Event::UeReport { .. } => EventKind::UeReport,
            Event::UeMeasure(_) => EventKind::UeMeasure,
            Event::HandoverUe(_) => EventKind::HandoverUe,
            Event::CellMeasure(_) => EventKind::CellMeasure,
        }
    }

    /// Maps a controller request to its event. Returns `None` for messages
    /// that are not dispatched to handlers.
    pub fn from_request(body: &MessageBody) -> Option<Event> {
        let event = match body {
            MessageBody::CellSetupRequest { cell_id } => Event::CellSetupRequest { cell_id: *cell_id },
            MessageBody::EnbSetupRequest { module_id } => Event::EnbSetupRequest {
                module_id: *module_id,
            },
            MessageBody::UeReport {
                module_id,
                trigger_id,
            } => Event::UeReport {
                module_id: *module_id,
                trigger_id: *trigger_id,
            },
            MessageBody::UeMeasure(m) => Event::UeMeasure(*m),
            MessageBody::HandoverUe(h) => Event::HandoverUe(*h),
            MessageBody::CellMeasure(c) => Event::CellMeasure(*c),
            _ => return None,
        };
        Some(event)
    }

    /// Trigger id carried by the event, if any
    pub fn trigger_id(&self) -> Option<TriggerId> {
        match self {
            Event::UeReport { trigger_id, .. } => Some(*trigger_id),
            Event::UeMeasure(m) => Some(m.trigger_id),
            Event::CellMeasure(c) => Some(c.trigger_id),
            _ => None,
        }
    }

    /// Module id carried by the event, if any
    pub fn module_id(&self) -> Option<ModuleId> {
        match self {
            Event::EnbSetupRequest { module_id } | Event::UeReport { module_id, .. } => {
                Some(*module_id)
            }
            Event::UeMeasure(m) => Some(m.module_id),
            Event::HandoverUe(h) => Some(h.module_id),
            Event::CellMeasure(c) => Some(c.module_id),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Failure reported by a handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {code})")]
pub struct HandlerError {
    code: i32,
    message: String,
}

impl HandlerError {
    /// Creates an error with the generic failure code.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(status::GENERIC, message)
    }

    /// Creates an error with a specific status code. A zero code is
    /// replaced by the generic failure code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        let code = if code == status::OK { status::GENERIC } else { code };
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status code sent to the controller
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Human readable reason
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type returned by handlers
pub type HandlerResult = Result<(), HandlerError>;

/// Messages queued by handlers during a dispatch.
///
/// The session sends them after the dispatch and its acknowledgement.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<MessageBody>,
}

impl Outbox {
    /// Creates an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for the controller. Handlers queue reports
    /// through [`Outbox::report`].
    pub(crate) fn send(&mut self, body: MessageBody) {
        self.messages.push(body);
    }

    /// Queues a trigger report.
    pub fn report(&mut self, trigger_id: TriggerId, payload: impl Into<Bytes>) -> HandlerResult {
        let payload = payload.into();
        if payload.len() > MAX_REPORT_PAYLOAD {
            return Err(HandlerError::with_code(
                status::INVALID,
                format!(
                    "report payload of {} bytes exceeds {}",
                    payload.len(),
                    MAX_REPORT_PAYLOAD
                ),
            ));
        }
        self.send(MessageBody::Report(Report {
            trigger_id,
            payload,
        }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consumes the outbox, returning queued messages in order
    pub fn into_messages(self) -> Vec<MessageBody> {
        self.messages
    }
}

/// A handler for one or more event kinds.
pub trait EventHandler: Send {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send,
{
    fn handle(&mut self, event: &Event, outbox: &mut Outbox) -> HandlerResult {
        self(event, outbox)
    }
}

/// Capability set of an agent: one method per event kind, each acking by
/// default. Registered once with [`Dispatcher::register_ops`].
pub trait AgentOps: Send + 'static {
    fn init(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn release(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn disconnected(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn cell_setup_request(&mut self, _cell_id: CellId, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn enb_setup_request(&mut self, _module_id: ModuleId, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn ue_report(
        &mut self,
        _module_id: ModuleId,
        _trigger_id: TriggerId,
        _outbox: &mut Outbox,
    ) -> HandlerResult {
        Ok(())
    }

    fn ue_measure(&mut self, _request: &UeMeasure, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn handover_ue(&mut self, _request: &HandoverUe, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }

    fn cell_measure(&mut self, _request: &CellMeasure, _outbox: &mut Outbox) -> HandlerResult {
        Ok(())
    }
}

/// Adapts a shared `AgentOps` to the per-kind handler registry.
struct OpsHandler<O> {
    ops: Arc<Mutex<O>>,
}

impl<O: AgentOps> EventHandler for OpsHandler<O> {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox) -> HandlerResult {
        let mut ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            Event::Init => ops.init(outbox),
            Event::Release => ops.release(outbox),
            Event::Disconnected => ops.disconnected(outbox),
            Event::CellSetupRequest { cell_id } => ops.cell_setup_request(*cell_id, outbox),
            Event::EnbSetupRequest { module_id } => ops.enb_setup_request(*module_id, outbox),
            Event::UeReport {
                module_id,
                trigger_id,
            } => ops.ue_report(*module_id, *trigger_id, outbox),
            Event::UeMeasure(m) => ops.ue_measure(m, outbox),
            Event::HandoverUe(h) => ops.handover_ue(h, outbox),
            Event::CellMeasure(c) => ops.cell_measure(c, outbox),
        }
    }
}

/// Per-kind handler registry.
pub struct Dispatcher {
    registry: [Vec<Box<dyn EventHandler>>; EventKind::COUNT],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no handlers
    pub fn new() -> Self {
        Self {
            registry: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Appends a boxed handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
        debug!("Registering handler for {}", kind);
        self.registry[kind.index()].push(handler);
    }

    /// Appends a handler for `kind`.
    pub fn register_handler<H: EventHandler + 'static>(&mut self, kind: EventKind, handler: H) {
        self.register(kind, Box::new(handler));
    }

    /// Appends a closure handler for `kind`.
    pub fn register_fn<F>(&mut self, kind: EventKind, f: F)
    where
        F: FnMut(&Event, &mut Outbox) -> HandlerResult + Send + 'static,
    {
        self.register_handler(kind, f);
    }

    /// Wires `ops` into every event kind. Returns the shared instance so
    /// the caller can inspect it later.
    pub fn register_ops<O: AgentOps>(&mut self, ops: O) -> Arc<Mutex<O>> {
        let ops = Arc::new(Mutex::new(ops));
        for kind in EventKind::ALL {
            self.register_handler(
                kind,
                OpsHandler {
                    ops: Arc::clone(&ops),
                },
            );
        }
        ops
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry[kind.index()].len()
    }

    /// Runs every handler registered for the event's kind and returns the
    /// aggregated status: 0 if all succeeded (or none is registered),
    /// otherwise the code of the first failure.
    pub fn dispatch(&mut self, event: &Event, outbox: &mut Outbox) -> i32 {
        let kind = event.kind();
        let mut result = status::OK;

        for (i, handler) in self.registry[kind.index()].iter_mut().enumerate() {
            let code = match catch_unwind(AssertUnwindSafe(|| handler.handle(event, outbox))) {
                Ok(Ok(())) => status::OK,
                Ok(Err(e)) => {
                    warn!("{} handler #{} failed: {}", kind, i, e);
                    e.code()
                }
                Err(_) => {
                    warn!("{} handler #{} panicked", kind, i);
                    status::GENERIC
                }
            };
            if result == status::OK {
                result = code;
            }
        }

        debug!("Dispatched {} (status {})", event, result);
        result
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind.name(), &self.handler_count(kind));
        }
        map.finish()
    }
}
