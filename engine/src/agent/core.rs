//! Agent Core
//!
//! Drives one task through the request, tool call, dispatch, result cycle:
//!
//! 1. Send the task's messages to the provider with the attempt's token
//! 2. Commit the reply as an ASSISTANT message
//! 3. Dispatch each ToolUse in order and commit all results as one USER message
//! 4. A reply without tool uses ends the attempt as COMPLETED or NEEDS_HELP
//!
//! Transport faults are retried with exponential backoff. A takeover or
//! cancel fires the attempt's token; the loop notices at its next checkpoint
//! and leaves the task as the operator set it.

use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::RetryPolicy;
use crate::config::AgentConfig;
use crate::llm::{ConversationAdapter, LLMError};
use crate::message_bus::Event;
use crate::task::manager::skipped_results;
use crate::task::{Attempt, Finish, TaskManager, TaskStatus};
use crate::tools::ComputerTools;
use sdk::{Action, ContentBlock};

/// Default provider round-trips per attempt
pub const DEFAULT_MAX_TURNS: usize = 100;

/// Default prefix of a final reply asking for operator help
pub const DEFAULT_NEEDS_HELP_MARKER: &str = "[needs_help]";

/// How one run of the control loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    NeedsHelp,
    /// The task is FAILED with this diagnostic
    Failed(String),
    /// A takeover or cancel stopped the loop; the task is as the operator left it
    Interrupted,
    /// The task was not in a state the loop may drive
    NotRunnable,
}

impl From<Finish> for RunOutcome {
    fn from(finish: Finish) -> Self {
        match finish {
            Finish::Completed => RunOutcome::Completed,
            Finish::NeedsHelp => RunOutcome::NeedsHelp,
            Finish::Failed(error) => RunOutcome::Failed(error),
        }
    }
}

pub struct AgentCore {
    tasks: Arc<TaskManager>,
    adapter: ConversationAdapter,
    tools: Arc<ComputerTools>,
    retry: RetryPolicy,
    max_turns: usize,
    needs_help_marker: String,
}

impl AgentCore {
    pub fn new(
        tasks: Arc<TaskManager>,
        adapter: ConversationAdapter,
        tools: Arc<ComputerTools>,
    ) -> Self {
        Self {
            tasks,
            adapter,
            tools,
            retry: RetryPolicy::default(),
            max_turns: DEFAULT_MAX_TURNS,
            needs_help_marker: DEFAULT_NEEDS_HELP_MARKER.to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_needs_help_marker(mut self, marker: impl Into<String>) -> Self {
        self.needs_help_marker = marker.into();
        self
    }

    /// Apply the `[agent]` config section.
    pub fn configured(self, config: &AgentConfig) -> Self {
        self.with_retry_policy(RetryPolicy::from_config(config))
            .with_max_turns(config.max_turns)
            .with_needs_help_marker(config.needs_help_marker.clone())
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Run the control loop for a task until it finishes or is handed off.
    ///
    /// Holds the task's run lock for the whole attempt, so at most one loop
    /// drives a task at a time.
    pub async fn run(&self, task_id: &str) -> Result<RunOutcome, EngineError> {
        let _run = self.tasks.run_lock(task_id).await?;

        if !self.wait_until_scheduled(task_id).await? {
            return Ok(RunOutcome::Interrupted);
        }

        let Some(attempt) = self.tasks.begin_attempt(task_id).await? else {
            return Ok(RunOutcome::NotRunnable);
        };

        let span = info_span!("agent_run", task_id = %task_id, provider = self.adapter.provider_name());
        let outcome = self.drive(&attempt).instrument(span).await?;
        info!(task_id = %task_id, outcome = ?outcome, "Control loop exited");
        Ok(outcome)
    }

    /// Hold a PENDING task until its scheduled time. Returns false if the
    /// task was cancelled while waiting.
    async fn wait_until_scheduled(&self, task_id: &str) -> Result<bool, EngineError> {
        let task = self.tasks.get(task_id).await?;
        let Some(at) = task.scheduled_for else {
            return Ok(true);
        };
        if task.status != TaskStatus::Pending {
            return Ok(true);
        }
        let Ok(delay) = (at - chrono::Utc::now()).to_std() else {
            // Already due
            return Ok(true);
        };

        info!(task_id = %task_id, scheduled_for = %at, "Waiting for scheduled start");
        let token = self.tasks.cancellation_token(task_id).await?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(false),
            _ = tokio::time::sleep(delay) => Ok(true),
        }
    }

    async fn drive(&self, attempt: &Attempt) -> Result<RunOutcome, EngineError> {
        let task_id = attempt.task_id.as_str();
        let mut retries = 0u32;
        let mut turns = 0usize;

        loop {
            if attempt.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }
            if turns >= self.max_turns {
                let reason = format!("max turns ({}) exceeded", self.max_turns);
                error!(task_id = %task_id, "{}", reason);
                return self.conclude(attempt, Finish::Failed(reason)).await;
            }

            let task = self.tasks.get(task_id).await?;
            if !task.is_assistant_driven() {
                return Ok(RunOutcome::Interrupted);
            }

            let reply = self
                .adapter
                .send(&task.messages, &task.model, &attempt.token)
                .await;

            let content = match reply {
                Ok(content) => {
                    retries = 0;
                    content
                }
                Err(LLMError::Aborted) => {
                    info!(task_id = %task_id, "Provider call aborted");
                    return Ok(RunOutcome::Interrupted);
                }
                Err(e) if e.is_retryable() => {
                    retries += 1;
                    if !self.retry.allows(retries) {
                        error!(task_id = %task_id, retries = retries - 1, error = %e, "Retry budget exhausted");
                        return self.conclude(attempt, Finish::Failed(e.to_string())).await;
                    }

                    let delay = self.retry.delay_for(retries);
                    warn!(
                        task_id = %task_id,
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = attempt.token.cancelled() => return Ok(RunOutcome::Interrupted),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(e) => {
                    let fatal = EngineError::from(e);
                    error!(task_id = %task_id, error = %fatal, "Provider call failed permanently");
                    return self
                        .conclude(attempt, Finish::Failed(fatal.to_string()))
                        .await;
                }
            };

            let message = match self.tasks.commit_assistant_turn(attempt, content).await {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(RunOutcome::Interrupted),
                Err(EngineError::Validation(reason)) => {
                    let reason = format!("malformed assistant turn: {}", reason);
                    error!(task_id = %task_id, "{}", reason);
                    return self.conclude(attempt, Finish::Failed(reason)).await;
                }
                Err(e) => return Err(e),
            };
            turns += 1;

            let tool_uses = message.tool_uses();
            if tool_uses.is_empty() {
                let finish = if self.asks_for_help(&message.text()) {
                    Finish::NeedsHelp
                } else {
                    Finish::Completed
                };
                return self.conclude(attempt, finish).await;
            }

            debug!(task_id = %task_id, turn = turns, tool_uses = tool_uses.len(), "Executing tool uses");
            let results = self.execute_tool_uses(attempt, tool_uses).await;
            self.tasks.commit_tool_results(task_id, results).await?;
        }
    }

    /// Dispatch tool uses strictly in order. Once the token fires, the rest
    /// are answered as skipped without touching the desktop.
    async fn execute_tool_uses(
        &self,
        attempt: &Attempt,
        tool_uses: Vec<(String, String, serde_json::Value)>,
    ) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(tool_uses.len());

        for (id, name, input) in tool_uses {
            if attempt.is_cancelled() {
                debug!(task_id = %attempt.task_id, tool = %name, "Skipping tool use after losing control");
                results.extend(skipped_results(&[id]));
                continue;
            }

            let envelope = self.tools.invoke(&name, &input).await;
            let described = Action::from_tool_call(&name, &input)
                .map(|action| action.to_string())
                .unwrap_or_else(|_| name.clone());

            self.tasks
                .bus()
                .publish(Event::ActionDispatched {
                    task_id: attempt.task_id.clone(),
                    tool: name,
                    action: described,
                    is_error: envelope.is_error,
                })
                .await;

            results.push(envelope.into_tool_result(id));
        }

        results
    }

    async fn conclude(&self, attempt: &Attempt, finish: Finish) -> Result<RunOutcome, EngineError> {
        match self.tasks.finish(attempt, finish.clone()).await? {
            Some(_) => Ok(finish.into()),
            None => Ok(RunOutcome::Interrupted),
        }
    }

    fn asks_for_help(&self, text: &str) -> bool {
        let marker = self.needs_help_marker.trim();
        !marker.is_empty()
            && text
                .trim_start()
                .to_lowercase()
                .starts_with(&marker.to_lowercase())
    }
}
