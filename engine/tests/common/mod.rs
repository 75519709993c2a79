//! Scripted fakes shared by the integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskpilot_engine::agent::{AgentCore, AgentService, RetryPolicy};
use deskpilot_engine::desktop::{ActionDispatcher, InputDriver};
use deskpilot_engine::llm::{
    ConversationAdapter, LLMError, LLMProvider, ProviderRequest, ProviderResponse,
};
use deskpilot_engine::message_bus::MessageBus;
use deskpilot_engine::task::{Task, TaskManager};
use deskpilot_engine::tools::ComputerTools;
use sdk::action::{
    ClickMouse, DragMouse, MoveMouse, PressKeys, PressMouse, Scroll, TraceMouse, TypeKeys,
    TypeText,
};
use sdk::{ContentBlock, Coordinates};

/// One scripted provider response
pub enum Step {
    Reply(Vec<Value>),
    Fail(LLMError),
    /// Never answers; only cancellation ends the call
    Hang,
}

pub fn text(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

pub fn tool_use(id: &str, action: &str, input: Value) -> Value {
    json!({"type": "tool_use", "id": id, "name": format!("computer_{}", action), "input": input})
}

/// Replays a script of steps, then answers "done" forever
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    /// Number of request messages seen per call
    pub request_sizes: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &ProviderRequest,
    ) -> deskpilot_engine::llm::Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.request_sizes
            .lock()
            .unwrap()
            .push(request.messages.len());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(content)) => Ok(ProviderResponse {
                content,
                stop_reason: Some("end_turn".into()),
            }),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(ProviderResponse {
                content: vec![text("done")],
                stop_reason: Some("end_turn".into()),
            }),
        }
    }
}

/// Records every driver call with its salient arguments
#[derive(Default)]
pub struct RecordingDriver {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingDriver {
    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    async fn move_mouse(&self, a: &MoveMouse) -> Result<()> {
        self.record(format!("move_mouse {}", a.coordinates))
    }

    async fn trace_mouse(&self, a: &TraceMouse) -> Result<()> {
        self.record(format!("trace_mouse {}", a.path.len()))
    }

    async fn click_mouse(&self, a: &ClickMouse) -> Result<()> {
        let at = a
            .coordinates
            .map(|c| c.to_string())
            .unwrap_or_else(|| "here".into());
        self.record(format!("click_mouse {:?} x{} at {}", a.button, a.click_count, at))
    }

    async fn press_mouse(&self, a: &PressMouse) -> Result<()> {
        self.record(format!("press_mouse {:?} {:?}", a.button, a.press))
    }

    async fn drag_mouse(&self, a: &DragMouse) -> Result<()> {
        self.record(format!("drag_mouse {}", a.path.len()))
    }

    async fn scroll(&self, a: &Scroll) -> Result<()> {
        self.record(format!("scroll {:?} x{}", a.direction, a.scroll_count))
    }

    async fn type_keys(&self, a: &TypeKeys) -> Result<()> {
        self.record(format!("type_keys {}", a.keys.join("+")))
    }

    async fn press_keys(&self, a: &PressKeys) -> Result<()> {
        self.record(format!("press_keys {}", a.keys.join("+")))
    }

    async fn type_text(&self, a: &TypeText) -> Result<()> {
        self.record(format!("type_text {}", a.text))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot".into())?;
        Ok(tiny_png())
    }

    async fn cursor_position(&self) -> Result<Coordinates> {
        self.record("cursor_position".into())?;
        Ok(Coordinates::new(10, 10))
    }
}

pub fn tiny_png() -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(8, 8)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Poll until the provider has been called at least `n` times
pub async fn wait_for_calls(provider: &ScriptedProvider, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.calls() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("provider was not called");
}

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

pub struct Harness {
    pub service: Arc<AgentService>,
    pub tasks: Arc<TaskManager>,
    pub bus: Arc<MessageBus>,
    pub provider: Arc<ScriptedProvider>,
    pub driver: Arc<RecordingDriver>,
}

pub fn harness(steps: Vec<Step>) -> Harness {
    harness_with_retry(steps, fast_retry(3))
}

pub fn harness_with_retry(steps: Vec<Step>, retry: RetryPolicy) -> Harness {
    let bus = Arc::new(MessageBus::new());
    let tasks = Arc::new(TaskManager::new("test-model", Arc::clone(&bus)));
    let provider = Arc::new(ScriptedProvider::new(steps));
    let driver = Arc::new(RecordingDriver::default());

    let dispatcher = Arc::new(ActionDispatcher::new(driver.clone()));
    let tools = Arc::new(ComputerTools::new(dispatcher));
    let adapter = ConversationAdapter::new(provider.clone(), "system", tools.declarations());
    let core = AgentCore::new(Arc::clone(&tasks), adapter, tools).with_retry_policy(retry);

    Harness {
        service: Arc::new(AgentService::new(Arc::new(core))),
        tasks,
        bus,
        provider,
        driver,
    }
}

/// Every ToolUse is answered by exactly one later ToolResult
pub fn assert_tool_uses_paired(task: &Task) {
    let mut answers: HashMap<String, usize> = HashMap::new();
    let mut uses: Vec<(usize, String)> = Vec::new();

    for (index, message) in task.messages.iter().enumerate() {
        for block in &message.content {
            match block {
                ContentBlock::ToolUse { id, .. } => uses.push((index, id.clone())),
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    assert!(
                        uses.iter().any(|(i, id)| id == tool_use_id && *i < index),
                        "result {} has no earlier tool use",
                        tool_use_id
                    );
                    *answers.entry(tool_use_id.clone()).or_default() += 1;
                }
                _ => {}
            }
        }
    }

    for (_, id) in uses {
        assert_eq!(answers.get(&id), Some(&1), "tool use {} not answered once", id);
    }
}

/// The ToolResult blocks of a message as (id, is_error, text)
pub fn results_of(task: &Task, index: usize) -> Vec<(String, bool, String)> {
    task.messages[index]
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((
                tool_use_id.clone(),
                *is_error,
                content
                    .iter()
                    .filter_map(ContentBlock::as_text)
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            _ => None,
        })
        .collect()
}
