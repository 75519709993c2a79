//! Command handlers for CLI operations
//!
//! - run: drive one task on this desktop until it completes, fails or needs help
//! - config show: print the effective configuration
//! - tools: list the computer tools offered to the model

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agent::{AgentCore, AgentService, RunOutcome};
use crate::config::Config;
use crate::desktop::{ActionDispatcher, XdotoolDriver};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::prompt::agent_system_prompt;
use crate::llm::{ConversationAdapter, ToolDeclaration};
use crate::message_bus::{Event, EventType, MessageBus};
use crate::task::{CreateTask, Priority, Task, TaskManager};
use crate::tools::{computer_tool_declarations, ComputerTools};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run a task on this desktop.
///
/// Ctrl-C hands control to the operator; the loop stops at its next
/// checkpoint and the task is reported as it stands.
pub async fn handle_run(
    description: String,
    model: Option<String>,
    priority: Priority,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let provider = AnthropicProvider::from_env(config.llm.anthropic.clone())
        .context("Anthropic provider unavailable")?;

    let bus = Arc::new(MessageBus::new());
    let tasks = Arc::new(TaskManager::new(
        config.llm.default_model.clone(),
        Arc::clone(&bus),
    ));

    let driver = Arc::new(XdotoolDriver::new(
        config.desktop.display.clone(),
        Duration::from_secs(config.desktop.command_timeout_secs),
    ));
    let dispatcher = Arc::new(
        ActionDispatcher::new(driver).with_screenshot_limit(config.desktop.screenshot_max_bytes),
    );
    let tools = Arc::new(ComputerTools::new(dispatcher));

    let adapter = ConversationAdapter::new(
        Arc::new(provider),
        agent_system_prompt(&config.agent.needs_help_marker),
        tools.declarations(),
    )
    .with_max_output_tokens(config.llm.max_output_tokens)
    .with_request_timeout(Duration::from_secs(config.llm.request_timeout_secs));

    let core = Arc::new(AgentCore::new(tasks, adapter, tools).configured(&config.agent));
    let service = Arc::new(AgentService::new(core));

    let progress = match format {
        OutputFormat::Text => Some(spawn_progress_printer(&bus).await),
        OutputFormat::Json => None,
    };

    let mut request = CreateTask::new(description.clone()).with_priority(priority);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    let task = service
        .create_task(request)
        .await
        .context("Failed to create task")?;

    if let OutputFormat::Text = format {
        println!("Executing task: {}", description);
        println!("  Task ID: {}", task.id);
        println!("  Model:   {}", task.model);
        println!("  Press Ctrl-C to take over");
        println!();
    }

    let watcher = {
        let service = Arc::clone(&service);
        let task_id = task.id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(task_id = %task_id, "Ctrl-C received, taking over");
                if let Err(e) = service.take_over(&task_id).await {
                    warn!(task_id = %task_id, error = %e, "Takeover failed");
                }
            }
        })
    };

    let outcome = service
        .wait(&task.id)
        .await
        .context("Control loop failed")?;
    watcher.abort();
    if let Some(progress) = progress {
        progress.abort();
    }

    let task = service.get_task(&task.id).await?;
    info!(task_id = %task.id, status = %task.status, outcome = ?outcome, "Run finished");
    print_run_result(&task, &outcome, format)?;

    match outcome {
        RunOutcome::Failed(error) => Err(anyhow::anyhow!("Task failed: {}", error)),
        _ => Ok(()),
    }
}

async fn spawn_progress_printer(bus: &MessageBus) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe(EventType::ActionDispatched).await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Event::ActionDispatched {
                action, is_error, ..
            } = event
            {
                let mark = if is_error { "✗" } else { "→" };
                println!("  {} {}", mark, action);
            }
        }
    })
}

fn print_run_result(task: &Task, outcome: &RunOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            match outcome {
                RunOutcome::Completed => println!("✓ Task completed"),
                RunOutcome::NeedsHelp => println!("? Task needs help"),
                RunOutcome::Failed(error) => println!("✗ Task failed: {}", error),
                RunOutcome::Interrupted => println!("■ Control taken over"),
                RunOutcome::NotRunnable => println!("· Task was not runnable"),
            }
            println!("  Status:   {}", task.status);
            println!("  Control:  {}", task.control);
            println!("  Messages: {}", task.messages.len());
            if let Some(text) = task.last_assistant_text().filter(|t| !t.is_empty()) {
                println!();
                println!("{}", text);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "outcome": outcome_label(outcome),
                "task": task,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::NeedsHelp => "needs_help",
        RunOutcome::Failed(_) => "failed",
        RunOutcome::Interrupted => "interrupted",
        RunOutcome::NotRunnable => "not_runnable",
    }
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

/// List the computer tools
pub fn handle_tools(format: OutputFormat) -> Result<()> {
    let declarations = computer_tool_declarations();
    match format {
        OutputFormat::Text => {
            println!("Computer tools ({}):", declarations.len());
            println!();
            for declaration in &declarations {
                println!("  {:<26} {}", declaration.name, tool_summary(declaration));
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "tools": declarations,
                "count": declarations.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// First line of a tool description
fn tool_summary(declaration: &ToolDeclaration) -> &str {
    declaration.description.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_summary_is_first_line() {
        let declarations = computer_tool_declarations();
        let type_keys = declarations
            .iter()
            .find(|d| d.name == "computer_type_keys")
            .unwrap();
        let summary = tool_summary(type_keys);
        assert!(summary.starts_with("Simulates typing a sequence of keys"));
        assert!(!summary.contains("VALID KEYS"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&RunOutcome::NeedsHelp), "needs_help");
        assert_eq!(outcome_label(&RunOutcome::Failed("x".into())), "failed");
    }

    #[test]
    fn test_config_show_renders() {
        handle_config_show(&Config::default_config(), OutputFormat::Json).unwrap();
        handle_config_show(&Config::default_config(), OutputFormat::Text).unwrap();
    }
}
