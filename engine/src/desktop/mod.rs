//! Desktop actions
//!
//! [`ActionDispatcher`] is the single entry point from typed [`Action`]s to
//! the OS input boundary. It validates every action before touching the
//! desktop, runs it to completion, and reports driver faults as
//! [`EngineError::ToolExecution`]. The boundary itself sits behind the
//! [`InputDriver`] trait so tests and other platforms can swap it out.

pub mod screenshot;
pub mod xdotool;

pub use screenshot::{bound_screenshot, EncodedImage, MAX_SCREENSHOT_BYTES};
pub use xdotool::XdotoolDriver;

use anyhow::Result;
use async_trait::async_trait;
use sdk::action::{
    ClickMouse, DragMouse, MoveMouse, PressKeys, PressMouse, Scroll, TraceMouse, TypeKeys,
    TypeText,
};
use sdk::errors::EngineError;
use sdk::{Action, Coordinates};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OS input boundary.
///
/// Implementations execute one action to completion. Delays arrive in
/// milliseconds as received on the wire and have already been validated.
#[async_trait]
pub trait InputDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn move_mouse(&self, action: &MoveMouse) -> Result<()>;
    async fn trace_mouse(&self, action: &TraceMouse) -> Result<()>;
    async fn click_mouse(&self, action: &ClickMouse) -> Result<()>;
    async fn press_mouse(&self, action: &PressMouse) -> Result<()>;
    async fn drag_mouse(&self, action: &DragMouse) -> Result<()>;
    async fn scroll(&self, action: &Scroll) -> Result<()>;
    async fn type_keys(&self, action: &TypeKeys) -> Result<()>;
    async fn press_keys(&self, action: &PressKeys) -> Result<()>;
    async fn type_text(&self, action: &TypeText) -> Result<()>;

    /// Capture the whole screen as encoded image bytes (PNG)
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn cursor_position(&self) -> Result<Coordinates>;
}

/// Successful outcome of an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// Opaque acknowledgement such as "mouse clicked"
    Ack(&'static str),
    Position(Coordinates),
    Image(EncodedImage),
}

pub struct ActionDispatcher {
    driver: Arc<dyn InputDriver>,
    screenshot_max_bytes: usize,
}

impl ActionDispatcher {
    pub fn new(driver: Arc<dyn InputDriver>) -> Self {
        Self {
            driver,
            screenshot_max_bytes: MAX_SCREENSHOT_BYTES,
        }
    }

    pub fn with_screenshot_limit(mut self, max_bytes: usize) -> Self {
        self.screenshot_max_bytes = max_bytes;
        self
    }

    /// Validate and execute one action.
    ///
    /// Invalid actions never reach the driver. Once started, an action is
    /// not interrupted.
    pub async fn dispatch(&self, action: &Action) -> Result<ActionOutput, EngineError> {
        action.validate()?;

        info!(driver = self.driver.name(), action = %action, "Dispatching action");
        let result = self.execute(action).await;

        match &result {
            Ok(_) => debug!(action = action.name(), "Action done"),
            Err(e) => warn!(action = action.name(), error = %e, "Action failed"),
        }
        result
    }

    async fn execute(&self, action: &Action) -> Result<ActionOutput, EngineError> {
        let driver = &self.driver;

        let ack = match action {
            Action::MoveMouse(a) => {
                driver.move_mouse(a).await.map_err(driver_error)?;
                "mouse moved"
            }
            Action::TraceMouse(a) => {
                driver.trace_mouse(a).await.map_err(driver_error)?;
                "mouse traced"
            }
            Action::ClickMouse(a) => {
                driver.click_mouse(a).await.map_err(driver_error)?;
                "mouse clicked"
            }
            Action::PressMouse(a) => {
                driver.press_mouse(a).await.map_err(driver_error)?;
                "mouse pressed"
            }
            Action::DragMouse(a) => {
                driver.drag_mouse(a).await.map_err(driver_error)?;
                "mouse dragged"
            }
            Action::Scroll(a) => {
                driver.scroll(a).await.map_err(driver_error)?;
                "scrolled"
            }
            Action::TypeKeys(a) => {
                driver.type_keys(a).await.map_err(driver_error)?;
                "keys typed"
            }
            Action::PressKeys(a) => {
                driver.press_keys(a).await.map_err(driver_error)?;
                "keys pressed"
            }
            Action::TypeText(a) => {
                driver.type_text(a).await.map_err(driver_error)?;
                "text typed"
            }
            Action::Wait(a) => {
                tokio::time::sleep(millis(a.duration)?).await;
                "waiting done"
            }
            Action::Screenshot(_) => {
                let raw = driver.screenshot().await.map_err(driver_error)?;
                let limit = self.screenshot_max_bytes;
                let image = tokio::task::spawn_blocking(move || bound_screenshot(&raw, limit))
                    .await
                    .map_err(|e| {
                        EngineError::ToolExecution(format!("Screenshot encoder failed: {}", e))
                    })??;
                return Ok(ActionOutput::Image(image));
            }
            Action::CursorPosition(_) => {
                let position = driver.cursor_position().await.map_err(driver_error)?;
                return Ok(ActionOutput::Position(position));
            }
        };

        Ok(ActionOutput::Ack(ack))
    }
}

/// Convert a validated millisecond count into a duration.
pub fn millis(ms: f64) -> Result<Duration, EngineError> {
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|e| EngineError::Validation(format!("invalid duration {}ms: {}", ms, e)))
}

fn driver_error(err: anyhow::Error) -> EngineError {
    EngineError::ToolExecution(format!("{:#}", err))
}
