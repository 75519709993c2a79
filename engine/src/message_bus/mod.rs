//! Message Bus for task lifecycle notifications
//!
//! The MessageBus lets observers (the CLI, tests, a future UI) follow task
//! state without polling the task manager. It uses bounded channels and
//! never blocks a publisher: the task manager publishes while holding a
//! task's lock, so a slow subscriber loses events instead of stalling the
//! state machine.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

use crate::task::{Control, TaskStatus};
use sdk::Role;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A task was created
    TaskCreated,
    /// A task moved between statuses
    StatusChanged,
    /// Control of a task moved between operator and assistant
    ControlChanged,
    /// A message was appended to a task's history
    MessageAppended,
    /// A desktop action finished, successfully or not
    ActionDispatched,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone)]
pub enum Event {
    TaskCreated {
        task_id: String,
        description: String,
    },
    StatusChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    ControlChanged {
        task_id: String,
        control: Control,
    },
    MessageAppended {
        task_id: String,
        message_id: String,
        role: Role,
    },
    /// `action` is the log-safe description of the action
    ActionDispatched {
        task_id: String,
        tool: String,
        action: String,
        is_error: bool,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::TaskCreated { .. } => EventType::TaskCreated,
            Event::StatusChanged { .. } => EventType::StatusChanged,
            Event::ControlChanged { .. } => EventType::ControlChanged,
            Event::MessageAppended { .. } => EventType::MessageAppended,
            Event::ActionDispatched { .. } => EventType::ActionDispatched,
        }
    }

    /// Id of the task the event concerns
    pub fn task_id(&self) -> &str {
        match self {
            Event::TaskCreated { task_id, .. }
            | Event::StatusChanged { task_id, .. }
            | Event::ControlChanged { task_id, .. }
            | Event::MessageAppended { task_id, .. }
            | Event::ActionDispatched { task_id, .. } => task_id,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers of its type and of `All`.
    ///
    /// Closed subscribers are pruned. Full subscribers miss the event.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(?event_type, "Subscriber lagging, event dropped");
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
