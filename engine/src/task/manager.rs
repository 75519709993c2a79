//! Task manager
//!
//! Owns every task and is the only writer of its status, control and
//! message history. Each task sits behind its own mutex so operator calls
//! (take over, resume, cancel) and loop-driven transitions never interleave.
//!
//! Besides the operator API, the manager exposes the checkpoints the control
//! loop uses: [`TaskManager::begin_attempt`],
//! [`TaskManager::commit_assistant_turn`],
//! [`TaskManager::commit_tool_results`] and [`TaskManager::finish`]. Each
//! checkpoint re-reads the task under its lock, so a takeover that lands
//! between two steps always wins.

use chrono::Utc;
use sdk::errors::EngineError;
use sdk::{ContentBlock, Role};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{is_transition_allowed, Control, CreateTask, Message, Task, TaskStatus};
use crate::message_bus::{Event, MessageBus};

/// Result text for tool uses that were never dispatched
pub const SKIPPED_ACTION_TEXT: &str =
    "Action skipped: the assistant no longer had control of this task";

/// Mutable state of one task
struct TaskSlot {
    task: Task,
    /// Fired on takeover or cancel; replaced on resume
    cancel: CancellationToken,
}

struct TaskEntry {
    slot: Mutex<TaskSlot>,
    /// Held by the control loop for the whole attempt
    run_lock: Arc<Mutex<()>>,
}

/// Handle for one autonomous run of a task
#[derive(Debug, Clone)]
pub struct Attempt {
    pub task_id: String,
    pub token: CancellationToken,
}

impl Attempt {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum Finish {
    Completed,
    NeedsHelp,
    Failed(String),
}

pub struct TaskManager {
    tasks: RwLock<HashMap<String, Arc<TaskEntry>>>,
    bus: Arc<MessageBus>,
    default_model: String,
}

impl TaskManager {
    pub fn new(default_model: impl Into<String>, bus: Arc<MessageBus>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            bus,
            default_model: default_model.into(),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    async fn entry(&self, task_id: &str) -> Result<Arc<TaskEntry>, EngineError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(Arc::clone)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    /// Create a PENDING task whose first message is the description.
    pub async fn create(&self, request: CreateTask) -> Result<Task, EngineError> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(EngineError::Validation(
                "Task description must not be empty".to_string(),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let first = Message::new(&id, Role::User, vec![ContentBlock::text(description)]);
        let first_id = first.id.clone();

        let task = Task {
            id: id.clone(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            control: Control::Assistant,
            priority: request.priority.unwrap_or_default(),
            model: request
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.default_model.clone()),
            created_by: request.created_by.unwrap_or(Role::User),
            scheduled_for: request.scheduled_for,
            messages: vec![first],
            error: None,
            created_at: now,
            updated_at: now,
            executed_at: None,
            completed_at: None,
        };

        let entry = Arc::new(TaskEntry {
            slot: Mutex::new(TaskSlot {
                task: task.clone(),
                cancel: CancellationToken::new(),
            }),
            run_lock: Arc::new(Mutex::new(())),
        });
        self.tasks.write().await.insert(id.clone(), entry);

        info!(task_id = %id, model = %task.model, priority = ?task.priority, "Task created");
        self.bus
            .publish(Event::TaskCreated {
                task_id: id.clone(),
                description: task.description.clone(),
            })
            .await;
        self.bus
            .publish(Event::MessageAppended {
                task_id: id,
                message_id: first_id,
                role: Role::User,
            })
            .await;

        Ok(task)
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, EngineError> {
        let entry = self.entry(task_id).await?;
        let slot = entry.slot.lock().await;
        Ok(slot.task.clone())
    }

    /// All tasks, highest priority first, then oldest first
    pub async fn list(&self) -> Vec<Task> {
        let entries: Vec<Arc<TaskEntry>> =
            self.tasks.read().await.values().map(Arc::clone).collect();

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            tasks.push(entry.slot.lock().await.task.clone());
        }
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        tasks
    }

    /// Hand control to the operator.
    ///
    /// Status is unchanged. Any in-flight provider call of the current
    /// attempt is aborted. Taking over a task already under operator control
    /// returns the snapshot unchanged.
    pub async fn take_over(&self, task_id: &str) -> Result<Task, EngineError> {
        let entry = self.entry(task_id).await?;
        let mut slot = entry.slot.lock().await;

        let status = slot.task.status;
        if !matches!(status, TaskStatus::Running | TaskStatus::NeedsHelp) {
            return Err(EngineError::InvalidTransition(format!(
                "cannot take over task {} in status {}",
                task_id, status
            )));
        }
        if slot.task.control == Control::User {
            return Ok(slot.task.clone());
        }

        slot.task.control = Control::User;
        slot.task.updated_at = Utc::now();
        slot.cancel.cancel();

        info!(task_id = %task_id, status = %status, "Operator took over task");
        self.bus
            .publish(Event::ControlChanged {
                task_id: task_id.to_string(),
                control: Control::User,
            })
            .await;

        Ok(slot.task.clone())
    }

    /// Give control back to the assistant and re-enter RUNNING.
    ///
    /// Invalid calls are rejected at once. A valid call waits for a previous
    /// control loop of this task to reach its exit checkpoint, so the
    /// guidance message lands after that loop's last tool results, and then
    /// checks the state again.
    pub async fn resume(
        &self,
        task_id: &str,
        guidance: Option<String>,
        model: Option<String>,
    ) -> Result<Task, EngineError> {
        let entry = self.entry(task_id).await?;
        check_resumable(&entry.slot.lock().await.task)?;

        let _run = entry.run_lock.lock().await;
        let mut slot = entry.slot.lock().await;
        check_resumable(&slot.task)?;

        let mut appended = Vec::new();
        let pending = slot.task.pending_tool_use_ids();
        if !pending.is_empty() {
            warn!(task_id = %task_id, count = pending.len(), "Closing unanswered tool uses before resume");
            appended.push(push_message(&mut slot.task, Role::User, skipped_results(&pending))?);
        }
        if let Some(text) = guidance.filter(|g| !g.trim().is_empty()) {
            appended.push(push_message(
                &mut slot.task,
                Role::User,
                vec![ContentBlock::text(text)],
            )?);
        }
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            info!(task_id = %task_id, model = %model, "Model override on resume");
            slot.task.model = model;
        }

        let from = slot.task.status;
        if from != TaskStatus::Running {
            transition(&mut slot.task, TaskStatus::Running)?;
        }
        slot.task.control = Control::Assistant;
        slot.task.updated_at = Utc::now();
        slot.cancel = CancellationToken::new();

        info!(task_id = %task_id, from = %from, "Task resumed");
        for message in &appended {
            self.publish_appended(message).await;
        }
        if from != TaskStatus::Running {
            self.publish_status(task_id, from, TaskStatus::Running).await;
        }
        self.bus
            .publish(Event::ControlChanged {
                task_id: task_id.to_string(),
                control: Control::Assistant,
            })
            .await;

        Ok(slot.task.clone())
    }

    /// Cancel a non-terminal task and abort its in-flight provider call.
    pub async fn cancel(&self, task_id: &str) -> Result<Task, EngineError> {
        let entry = self.entry(task_id).await?;
        let mut slot = entry.slot.lock().await;

        let from = transition(&mut slot.task, TaskStatus::Cancelled)?;
        slot.task.completed_at = Some(Utc::now());
        slot.cancel.cancel();

        info!(task_id = %task_id, from = %from, "Task cancelled");
        self.publish_status(task_id, from, TaskStatus::Cancelled).await;

        Ok(slot.task.clone())
    }

    /// Append a message on behalf of an external caller.
    ///
    /// Terminal tasks are immutable. The pairing of ToolUse and ToolResult
    /// blocks is enforced.
    pub async fn append_message(
        &self,
        task_id: &str,
        role: Role,
        content: Vec<ContentBlock>,
    ) -> Result<Task, EngineError> {
        let entry = self.entry(task_id).await?;
        let mut slot = entry.slot.lock().await;

        if slot.task.status.is_terminal() {
            return Err(EngineError::InvalidTransition(format!(
                "task {} is {} and no longer accepts messages",
                task_id, slot.task.status
            )));
        }

        let message = push_message(&mut slot.task, role, content)?;
        debug!(task_id = %task_id, role = %role, "Message appended");
        self.publish_appended(&message).await;

        Ok(slot.task.clone())
    }

    /// Serializes control loops of one task.
    pub async fn run_lock(&self, task_id: &str) -> Result<OwnedMutexGuard<()>, EngineError> {
        let entry = self.entry(task_id).await?;
        let lock = Arc::clone(&entry.run_lock);
        Ok(lock.lock_owned().await)
    }

    /// Token of the task's current attempt
    pub async fn cancellation_token(&self, task_id: &str) -> Result<CancellationToken, EngineError> {
        let entry = self.entry(task_id).await?;
        let slot = entry.slot.lock().await;
        Ok(slot.cancel.clone())
    }

    /// Start or continue autonomous work on a task.
    ///
    /// PENDING moves to RUNNING. A RUNNING task under assistant control is
    /// continued. Anything else is not runnable and yields `None`.
    pub async fn begin_attempt(&self, task_id: &str) -> Result<Option<Attempt>, EngineError> {
        let entry = self.entry(task_id).await?;
        let mut slot = entry.slot.lock().await;

        if slot.cancel.is_cancelled() {
            return Ok(None);
        }

        match (slot.task.status, slot.task.control) {
            (TaskStatus::Pending, _) => {
                transition(&mut slot.task, TaskStatus::Running)?;
                slot.task.control = Control::Assistant;
                slot.task.executed_at.get_or_insert_with(Utc::now);
                self.publish_status(task_id, TaskStatus::Pending, TaskStatus::Running)
                    .await;
            }
            (TaskStatus::Running, Control::Assistant) => {}
            (status, control) => {
                debug!(task_id = %task_id, status = %status, control = %control, "Task not runnable");
                return Ok(None);
            }
        }

        Ok(Some(Attempt {
            task_id: task_id.to_string(),
            token: slot.cancel.clone(),
        }))
    }

    /// Commit the assistant's turn, unless the attempt lost control while
    /// the provider was answering.
    pub async fn commit_assistant_turn(
        &self,
        attempt: &Attempt,
        content: Vec<ContentBlock>,
    ) -> Result<Option<Message>, EngineError> {
        let entry = self.entry(&attempt.task_id).await?;
        let mut slot = entry.slot.lock().await;

        if attempt.is_cancelled() || !slot.task.is_assistant_driven() {
            debug!(task_id = %attempt.task_id, "Discarding assistant turn after losing control");
            return Ok(None);
        }

        let message = push_message(&mut slot.task, Role::Assistant, content)?;
        self.publish_appended(&message).await;
        Ok(Some(message))
    }

    /// Append the tool results answering a committed assistant turn.
    ///
    /// Allowed in any status so that no ToolUse is ever left unanswered.
    pub async fn commit_tool_results(
        &self,
        task_id: &str,
        results: Vec<ContentBlock>,
    ) -> Result<Message, EngineError> {
        let entry = self.entry(task_id).await?;
        let mut slot = entry.slot.lock().await;

        let message = push_message(&mut slot.task, Role::User, results)?;
        self.publish_appended(&message).await;
        Ok(message)
    }

    /// Record how an attempt ended.
    ///
    /// Returns `None` when the attempt had already lost control, in which
    /// case the operator's transition stands.
    pub async fn finish(&self, attempt: &Attempt, finish: Finish) -> Result<Option<Task>, EngineError> {
        let entry = self.entry(&attempt.task_id).await?;
        let mut slot = entry.slot.lock().await;

        if attempt.is_cancelled() || !slot.task.is_assistant_driven() {
            debug!(task_id = %attempt.task_id, outcome = ?finish, "Ignoring outcome of interrupted attempt");
            return Ok(None);
        }

        let task = &mut slot.task;
        let to = match finish {
            Finish::Completed => {
                transition(task, TaskStatus::Completed)?;
                task.completed_at = Some(Utc::now());
                TaskStatus::Completed
            }
            Finish::NeedsHelp => {
                transition(task, TaskStatus::NeedsHelp)?;
                task.control = Control::User;
                TaskStatus::NeedsHelp
            }
            Finish::Failed(error) => {
                transition(task, TaskStatus::Failed)?;
                task.error = Some(error);
                task.completed_at = Some(Utc::now());
                TaskStatus::Failed
            }
        };

        info!(task_id = %attempt.task_id, status = %to, "Attempt finished");
        self.publish_status(&attempt.task_id, TaskStatus::Running, to)
            .await;
        if to == TaskStatus::NeedsHelp {
            self.bus
                .publish(Event::ControlChanged {
                    task_id: attempt.task_id.clone(),
                    control: Control::User,
                })
                .await;
        }

        Ok(Some(slot.task.clone()))
    }

    async fn publish_status(&self, task_id: &str, from: TaskStatus, to: TaskStatus) {
        self.bus
            .publish(Event::StatusChanged {
                task_id: task_id.to_string(),
                from,
                to,
            })
            .await;
    }

    async fn publish_appended(&self, message: &Message) {
        self.bus
            .publish(Event::MessageAppended {
                task_id: message.task_id.clone(),
                message_id: message.id.clone(),
                role: message.role,
            })
            .await;
    }
}

/// Whether control can be handed back to the assistant.
fn check_resumable(task: &Task) -> Result<(), EngineError> {
    match (task.status, task.control) {
        (TaskStatus::NeedsHelp, _) | (TaskStatus::Running, Control::User) => Ok(()),
        (TaskStatus::Running, Control::Assistant) => Err(EngineError::ControlUnavailable(format!(
            "task {} is already under assistant control",
            task.id
        ))),
        (status, _) => Err(EngineError::InvalidTransition(format!(
            "cannot resume task {} in status {}",
            task.id, status
        ))),
    }
}

/// `is_error` results for tool uses that were never dispatched
pub fn skipped_results(tool_use_ids: &[String]) -> Vec<ContentBlock> {
    tool_use_ids
        .iter()
        .map(|id| {
            ContentBlock::tool_result(id.clone(), vec![ContentBlock::text(SKIPPED_ACTION_TEXT)], true)
        })
        .collect()
}

fn transition(task: &mut Task, to: TaskStatus) -> Result<TaskStatus, EngineError> {
    let from = task.status;
    if !is_transition_allowed(from, to) {
        return Err(EngineError::InvalidTransition(format!(
            "task {}: {} -> {}",
            task.id, from, to
        )));
    }
    task.status = to;
    task.updated_at = Utc::now();
    Ok(from)
}

fn push_message(task: &mut Task, role: Role, content: Vec<ContentBlock>) -> Result<Message, EngineError> {
    check_pairing(task, role, &content)?;

    let message = Message::new(&task.id, role, content);
    task.messages.push(message.clone());
    task.updated_at = message.created_at;
    Ok(message)
}

/// Every ToolUse must be answered by exactly one ToolResult in the message
/// that directly follows it.
fn check_pairing(task: &Task, role: Role, content: &[ContentBlock]) -> Result<(), EngineError> {
    let pending = task.pending_tool_use_ids();

    let mut answered = HashSet::new();
    for id in content.iter().filter_map(ContentBlock::answered_tool_use_id) {
        if !pending.iter().any(|p| p == id) {
            return Err(EngineError::Validation(format!(
                "tool result {} does not answer a pending tool use",
                id
            )));
        }
        if !answered.insert(id) {
            return Err(EngineError::Validation(format!(
                "tool use {} answered more than once",
                id
            )));
        }
    }

    if !pending.is_empty() {
        if role != Role::User {
            return Err(EngineError::Validation(format!(
                "tool uses {:?} must be answered before the next {} message",
                pending, role
            )));
        }
        if let Some(missing) = pending.iter().find(|id| !answered.contains(id.as_str())) {
            return Err(EngineError::Validation(format!(
                "missing tool result for tool use {}",
                missing
            )));
        }
    }

    let mut seen: HashSet<&str> = task
        .messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(ContentBlock::tool_use_id)
        .collect();
    for id in content.iter().filter_map(ContentBlock::tool_use_id) {
        if !seen.insert(id) {
            return Err(EngineError::Validation(format!(
                "duplicate tool use id {}",
                id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_bus::EventType;
    use crate::task::Priority;
    use serde_json::json;

    fn manager() -> TaskManager {
        TaskManager::new("test-model", Arc::new(MessageBus::new()))
    }

    async fn running_task(manager: &TaskManager) -> (Task, Attempt) {
        let task = manager
            .create(CreateTask::new("open the calculator"))
            .await
            .unwrap();
        let attempt = manager.begin_attempt(&task.id).await.unwrap().unwrap();
        (manager.get(&task.id).await.unwrap(), attempt)
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let manager = manager();
        let task = manager.create(CreateTask::new("  say hi ")).await.unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.control, Control::Assistant);
        assert_eq!(task.model, "test-model");
        assert_eq!(task.description, "say hi");
        assert_eq!(task.messages.len(), 1);
        assert_eq!(task.messages[0].text(), "say hi");
    }

    #[tokio::test]
    async fn test_create_rejects_empty_description() {
        let err = manager().create(CreateTask::new("   ")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_begin_attempt_starts_running() {
        let manager = manager();
        let (task, _attempt) = running_task(&manager).await;

        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_take_over_keeps_status_and_cancels_attempt() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;

        let snapshot = manager.take_over(&task.id).await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Running);
        assert_eq!(snapshot.control, Control::User);
        assert!(attempt.is_cancelled());

        let again = manager.take_over(&task.id).await.unwrap();
        assert_eq!(again.control, Control::User);
    }

    #[tokio::test]
    async fn test_take_over_pending_rejected() {
        let manager = manager();
        let task = manager.create(CreateTask::new("x")).await.unwrap();
        let err = manager.take_over(&task.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_turn_discarded_after_takeover() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager.take_over(&task.id).await.unwrap();

        let committed = manager
            .commit_assistant_turn(&attempt, vec![ContentBlock::text("late")])
            .await
            .unwrap();
        assert!(committed.is_none());
        assert_eq!(manager.get(&task.id).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_appends_guidance_with_fresh_token() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager.take_over(&task.id).await.unwrap();

        let resumed = manager
            .resume(&task.id, Some("use the start menu".into()), Some("other-model".into()))
            .await
            .unwrap();
        assert_eq!(resumed.control, Control::Assistant);
        assert_eq!(resumed.status, TaskStatus::Running);
        assert_eq!(resumed.model, "other-model");
        assert_eq!(resumed.messages.last().unwrap().text(), "use the start menu");

        let next = manager.begin_attempt(&task.id).await.unwrap().unwrap();
        assert!(attempt.is_cancelled());
        assert!(!next.is_cancelled());
    }

    #[tokio::test]
    async fn test_resume_while_assistant_driving_rejected() {
        let manager = manager();
        let (task, _attempt) = running_task(&manager).await;
        let _run = manager.run_lock(&task.id).await.unwrap();

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            manager.resume(&task.id, Some("hint".into()), None),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, EngineError::ControlUnavailable(_)));
        assert_eq!(manager.get(&task.id).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_pending_rejected_while_loop_holds_lock() {
        let manager = manager();
        let task = manager.create(CreateTask::new("later")).await.unwrap();
        let _run = manager.run_lock(&task.id).await.unwrap();

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            manager.resume(&task.id, None, None),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_needs_help_then_resume() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;

        let snapshot = manager
            .finish(&attempt, Finish::NeedsHelp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.status, TaskStatus::NeedsHelp);
        assert_eq!(snapshot.control, Control::User);

        let resumed = manager.resume(&task.id, None, None).await.unwrap();
        assert_eq!(resumed.status, TaskStatus::Running);
        assert_eq!(resumed.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_from_terminal_rejected() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager.finish(&attempt, Finish::Completed).await.unwrap();

        let err = manager.cancel(&task.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_cancel_fires_token_and_blocks_finish() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;

        let snapshot = manager.cancel(&task.id).await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Cancelled);
        assert!(snapshot.completed_at.is_some());
        assert!(attempt.is_cancelled());

        let outcome = manager
            .finish(&attempt, Finish::Failed("late".into()))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(manager.get(&task.id).await.unwrap().error, None);
    }

    #[tokio::test]
    async fn test_failed_records_error() {
        let manager = manager();
        let (_task, attempt) = running_task(&manager).await;
        let snapshot = manager
            .finish(&attempt, Finish::Failed("transport error: 503".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("transport error: 503"));
    }

    #[tokio::test]
    async fn test_tool_results_allowed_after_cancel() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager
            .commit_assistant_turn(
                &attempt,
                vec![ContentBlock::tool_use("t1", "computer_screenshot", json!({}))],
            )
            .await
            .unwrap()
            .unwrap();
        manager.cancel(&task.id).await.unwrap();

        manager
            .commit_tool_results(&task.id, skipped_results(&["t1".to_string()]))
            .await
            .unwrap();
        assert!(manager.get(&task.id).await.unwrap().pending_tool_use_ids().is_empty());
    }

    #[tokio::test]
    async fn test_pairing_enforced() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager
            .commit_assistant_turn(
                &attempt,
                vec![
                    ContentBlock::tool_use("a", "computer_screenshot", json!({})),
                    ContentBlock::tool_use("b", "computer_cursor_position", json!({})),
                ],
            )
            .await
            .unwrap();

        // Text while tool uses are pending
        let err = manager
            .append_message(&task.id, Role::User, vec![ContentBlock::text("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Only one of two answered
        let err = manager
            .commit_tool_results(&task.id, vec![ContentBlock::tool_result("a", vec![], false)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains('b')));

        // Unknown id
        let err = manager
            .commit_tool_results(&task.id, vec![ContentBlock::tool_result("zzz", vec![], false)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        manager
            .commit_tool_results(
                &task.id,
                vec![
                    ContentBlock::tool_result("a", vec![], false),
                    ContentBlock::tool_result("b", vec![], false),
                ],
            )
            .await
            .unwrap();

        // Answered twice
        let err = manager
            .commit_tool_results(&task.id, vec![ContentBlock::tool_result("a", vec![], false)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_tool_use_id_rejected() {
        let manager = manager();
        let (_task, attempt) = running_task(&manager).await;
        let err = manager
            .commit_assistant_turn(
                &attempt,
                vec![
                    ContentBlock::tool_use("a", "computer_screenshot", json!({})),
                    ContentBlock::tool_use("a", "computer_screenshot", json!({})),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_to_terminal_task_rejected() {
        let manager = manager();
        let (task, _attempt) = running_task(&manager).await;
        manager.cancel(&task.id).await.unwrap();

        let err = manager
            .append_message(&task.id, Role::User, vec![ContentBlock::text("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_resume_closes_unanswered_tool_uses() {
        let manager = manager();
        let (task, attempt) = running_task(&manager).await;
        manager
            .commit_assistant_turn(
                &attempt,
                vec![ContentBlock::tool_use("a", "computer_screenshot", json!({}))],
            )
            .await
            .unwrap();
        manager.take_over(&task.id).await.unwrap();

        let resumed = manager
            .resume(&task.id, Some("go on".into()), None)
            .await
            .unwrap();
        assert!(resumed.pending_tool_use_ids().is_empty());
        assert_eq!(resumed.messages.last().unwrap().text(), "go on");
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let err = manager().get("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_events_published() {
        let manager = manager();
        let mut rx = manager.bus().subscribe(EventType::StatusChanged).await;
        let (_task, attempt) = running_task(&manager).await;
        manager.finish(&attempt, Finish::Completed).await.unwrap();

        let mut transitions = Vec::new();
        while let Ok(Event::StatusChanged { to, .. }) = rx.try_recv() {
            transitions.push(to);
        }
        assert_eq!(transitions, vec![TaskStatus::Running, TaskStatus::Completed]);
    }

    #[tokio::test]
    async fn test_list_orders_by_priority() {
        let manager = manager();
        manager
            .create(CreateTask::new("low").with_priority(Priority::Low))
            .await
            .unwrap();
        manager
            .create(CreateTask::new("urgent").with_priority(Priority::Urgent))
            .await
            .unwrap();

        let tasks = manager.list().await;
        assert_eq!(tasks[0].description, "urgent");
        assert_eq!(tasks[1].description, "low");
    }
}
