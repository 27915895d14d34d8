//! Task framework
//!
//! The session loop runs as an async task fed through a typed message
//! channel, following the actor model used across the agent. The agent
//! handle owns the sending side.

use tokio::sync::mpsc;

use emage_proto::MessageBody;

/// Task message envelope wrapping typed messages with control signals.
#[derive(Debug)]
pub enum TaskMessage<T> {
    /// Regular message payload
    Message(T),
    /// Shutdown signal - task should terminate gracefully
    Shutdown,
}

impl<T> TaskMessage<T> {
    /// Creates a new message envelope containing the given payload.
    pub fn message(msg: T) -> Self {
        TaskMessage::Message(msg)
    }

    /// Creates a shutdown signal.
    pub fn shutdown() -> Self {
        TaskMessage::Shutdown
    }
}

/// Base trait for agent tasks.
///
/// A task processes messages from its receive channel until it gets
/// `TaskMessage::Shutdown`, the channel closes, or its own I/O ends.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    /// The message type this task processes.
    type Message: Send;

    /// Runs the task's main loop.
    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

/// Commands from the agent handle to its session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send an agent-originated message to the controller
    Send(MessageBody),
}
