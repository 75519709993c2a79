//! Tool surface
//!
//! Exposes every desktop action as its own callable tool. Whatever the
//! dispatcher returns, a caller always gets a [`ToolEnvelope`]: text or an
//! image on success, a text description with `is_error` set on failure.

pub mod declarations;

pub use declarations::computer_tool_declarations;

use sdk::action::{
    ClickMouse, CursorPosition, DragMouse, MoveMouse, PressKeys, PressMouse, Screenshot, Scroll,
    TraceMouse, TypeKeys, TypeText, Wait,
};
use sdk::{Action, ToolEnvelope};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::desktop::{ActionDispatcher, ActionOutput};
use crate::llm::ToolDeclaration;

pub struct ComputerTools {
    dispatcher: Arc<ActionDispatcher>,
}

impl ComputerTools {
    pub fn new(dispatcher: Arc<ActionDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        computer_tool_declarations()
    }

    /// Invoke a tool by name with its JSON input.
    ///
    /// Unknown tools and malformed input come back as error envelopes.
    pub async fn invoke(&self, name: &str, input: &Value) -> ToolEnvelope {
        debug!(tool = %name, "Invoking tool");
        match Action::from_tool_call(name, input) {
            Ok(action) => self.run(action).await,
            Err(e) => {
                let verb = name
                    .strip_prefix(sdk::action::TOOL_PREFIX)
                    .and_then(failure_verb_for_name);
                match verb {
                    Some(verb) => ToolEnvelope::error(format!("Error {}: {}", verb, e)),
                    None => ToolEnvelope::error(format!("Error: {}", e)),
                }
            }
        }
    }

    pub async fn move_mouse(&self, params: MoveMouse) -> ToolEnvelope {
        self.run(Action::MoveMouse(params)).await
    }

    pub async fn trace_mouse(&self, params: TraceMouse) -> ToolEnvelope {
        self.run(Action::TraceMouse(params)).await
    }

    pub async fn click_mouse(&self, params: ClickMouse) -> ToolEnvelope {
        self.run(Action::ClickMouse(params)).await
    }

    pub async fn press_mouse(&self, params: PressMouse) -> ToolEnvelope {
        self.run(Action::PressMouse(params)).await
    }

    pub async fn drag_mouse(&self, params: DragMouse) -> ToolEnvelope {
        self.run(Action::DragMouse(params)).await
    }

    pub async fn scroll(&self, params: Scroll) -> ToolEnvelope {
        self.run(Action::Scroll(params)).await
    }

    pub async fn type_keys(&self, params: TypeKeys) -> ToolEnvelope {
        self.run(Action::TypeKeys(params)).await
    }

    pub async fn press_keys(&self, params: PressKeys) -> ToolEnvelope {
        self.run(Action::PressKeys(params)).await
    }

    pub async fn type_text(&self, params: TypeText) -> ToolEnvelope {
        self.run(Action::TypeText(params)).await
    }

    pub async fn wait(&self, params: Wait) -> ToolEnvelope {
        self.run(Action::Wait(params)).await
    }

    pub async fn screenshot(&self) -> ToolEnvelope {
        self.run(Action::Screenshot(Screenshot {})).await
    }

    pub async fn cursor_position(&self) -> ToolEnvelope {
        self.run(Action::CursorPosition(CursorPosition {})).await
    }

    async fn run(&self, action: Action) -> ToolEnvelope {
        match self.dispatcher.dispatch(&action).await {
            Ok(ActionOutput::Ack(ack)) => ToolEnvelope::text(ack),
            Ok(ActionOutput::Position(position)) => {
                ToolEnvelope::text(json!({"x": position.x, "y": position.y}).to_string())
            }
            Ok(ActionOutput::Image(image)) => ToolEnvelope::image(image.mime_type, &image.bytes),
            Err(e) => ToolEnvelope::error(format!("Error {}: {}", failure_verb(&action), e)),
        }
    }
}

fn failure_verb(action: &Action) -> &'static str {
    failure_verb_for_name(action.name()).unwrap_or("running action")
}

fn failure_verb_for_name(name: &str) -> Option<&'static str> {
    let verb = match name {
        "move_mouse" => "moving mouse",
        "trace_mouse" => "tracing mouse",
        "click_mouse" => "clicking mouse",
        "press_mouse" => "pressing mouse",
        "drag_mouse" => "dragging mouse",
        "scroll" => "scrolling",
        "type_keys" => "typing keys",
        "press_keys" => "pressing keys",
        "type_text" => "typing text",
        "wait" => "waiting",
        "screenshot" => "taking screenshot",
        "cursor_position" => "getting cursor position",
        _ => return None,
    };
    Some(verb)
}
