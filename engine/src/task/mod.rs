//! Tasks and their message history
//!
//! A [`Task`] is one unit of agent work. Its `status` and `control` fields
//! form two orthogonal axes:
//!
//! ```text
//! PENDING → RUNNING → COMPLETED | FAILED | CANCELLED | NEEDS_HELP
//! NEEDS_HELP → RUNNING (resume) | CANCELLED
//! ```
//!
//! `control` starts as ASSISTANT and flips to USER on takeover without
//! changing status. Tasks are mutated only through [`TaskManager`].

pub mod manager;

pub use manager::{Attempt, Finish, TaskManager};

use chrono::{DateTime, Utc};
use sdk::{ContentBlock, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Task status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    NeedsHelp,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::NeedsHelp => "NEEDS_HELP",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses are immutable once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a status transition is valid.
///
/// ```text
/// Pending → Running | Cancelled
/// Running → Completed | Failed | Cancelled | NeedsHelp
/// NeedsHelp → Running | Cancelled
/// ```
pub fn is_transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;

    match (from, to) {
        (Pending, Running) | (Pending, Cancelled) => true,
        (Running, Completed) | (Running, Failed) | (Running, Cancelled) | (Running, NeedsHelp) => {
            true
        }
        (NeedsHelp, Running) | (NeedsHelp, Cancelled) => true,
        _ => false,
    }
}

/// Who is driving the task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Control {
    Assistant,
    User,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Assistant => f.write_str("ASSISTANT"),
            Control::User => f.write_str("USER"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// One entry in a task's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub task_id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(task_id: impl Into<String>, role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            role,
            content,
            created_at: Utc::now(),
        }
    }

    /// ToolUse blocks as `(id, name, input)`, in the order received
    pub fn tool_uses(&self) -> Vec<(String, String, serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// True when the message is non-empty and every block is a ToolUse
    pub fn is_tool_use_only(&self) -> bool {
        !self.content.is_empty() && self.content.iter().all(ContentBlock::is_tool_use)
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Task snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub control: Control,
    pub priority: Priority,
    pub model: String,
    pub created_by: Role,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    /// Last diagnostic, set when the task fails
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Ids of ToolUse blocks that no later ToolResult answers, in order
    pub fn pending_tool_use_ids(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(ContentBlock::answered_tool_use_id)
            .collect();

        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(ContentBlock::tool_use_id)
            .filter(|id| !answered.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// The autonomous loop may act only in this state
    pub fn is_assistant_driven(&self) -> bool {
        self.status == TaskStatus::Running && self.control == Control::Assistant
    }

    /// Text of the last assistant message, if any
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
    }
}

/// Request to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_by: Option<Role>,
}

impl CreateTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}
