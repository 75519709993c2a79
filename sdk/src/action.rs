//! Desktop actions
//!
//! The closed set of input and observation operations an agent can request
//! against a desktop. On the wire an action is a JSON object discriminated by
//! its `action` field:
//!
//! ```json
//! {"action": "click_mouse", "coordinates": {"x": 10, "y": 10}, "button": "left", "clickCount": 1}
//! ```
//!
//! Parsing and [`Action::validate`] together reject malformed actions before
//! anything reaches the OS input boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EngineError;

/// Prefix shared by every tool that exposes an action.
pub const TOOL_PREFIX: &str = "computer_";

/// Screen position in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PressType {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveMouse {
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceMouse {
    pub path: Vec<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickMouse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub button: Button,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_keys: Option<Vec<String>>,
    pub click_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PressMouse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub button: Button,
    pub press: PressType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DragMouse {
    pub path: Vec<Coordinates>,
    pub button: Button,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scroll {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub direction: ScrollDirection,
    pub scroll_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeKeys {
    pub keys: Vec<String>,
    /// Milliseconds between key presses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PressKeys {
    pub keys: Vec<String>,
    pub press: PressType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeText {
    pub text: String,
    /// Milliseconds between characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    /// Sensitive text (passwords) is never written to logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sensitive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Wait {
    /// Milliseconds
    #[serde(default = "default_wait_duration")]
    pub duration: f64,
}

fn default_wait_duration() -> f64 {
    500.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Screenshot {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CursorPosition {}

/// One typed desktop action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    MoveMouse(MoveMouse),
    TraceMouse(TraceMouse),
    ClickMouse(ClickMouse),
    PressMouse(PressMouse),
    DragMouse(DragMouse),
    Scroll(Scroll),
    TypeKeys(TypeKeys),
    PressKeys(PressKeys),
    TypeText(TypeText),
    Wait(Wait),
    Screenshot(Screenshot),
    CursorPosition(CursorPosition),
}

impl Action {
    /// All action names in declaration order.
    pub const NAMES: [&'static str; 12] = [
        "move_mouse",
        "trace_mouse",
        "click_mouse",
        "press_mouse",
        "drag_mouse",
        "scroll",
        "type_keys",
        "press_keys",
        "type_text",
        "wait",
        "screenshot",
        "cursor_position",
    ];

    /// The wire name of this action (the `action` discriminator).
    pub fn name(&self) -> &'static str {
        match self {
            Action::MoveMouse(_) => "move_mouse",
            Action::TraceMouse(_) => "trace_mouse",
            Action::ClickMouse(_) => "click_mouse",
            Action::PressMouse(_) => "press_mouse",
            Action::DragMouse(_) => "drag_mouse",
            Action::Scroll(_) => "scroll",
            Action::TypeKeys(_) => "type_keys",
            Action::PressKeys(_) => "press_keys",
            Action::TypeText(_) => "type_text",
            Action::Wait(_) => "wait",
            Action::Screenshot(_) => "screenshot",
            Action::CursorPosition(_) => "cursor_position",
        }
    }

    /// The name of the tool exposing this action, e.g. `computer_click_mouse`.
    pub fn tool_name(&self) -> String {
        format!("{}{}", TOOL_PREFIX, self.name())
    }

    /// Parse and validate an action from its wire representation.
    pub fn parse(value: &serde_json::Value) -> Result<Self, EngineError> {
        let action: Action = serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Validation(format!("Malformed action: {}", e)))?;
        action.validate()?;
        Ok(action)
    }

    /// Build an action from a tool invocation.
    ///
    /// `input` carries the action's fields without the `action` discriminator;
    /// the discriminator is derived from the tool name.
    pub fn from_tool_call(tool_name: &str, input: &serde_json::Value) -> Result<Self, EngineError> {
        let name = tool_name
            .strip_prefix(TOOL_PREFIX)
            .filter(|name| Self::NAMES.contains(name))
            .ok_or_else(|| EngineError::Validation(format!("Unknown tool '{}'", tool_name)))?;

        let mut fields = match input {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(EngineError::Validation(format!(
                    "Tool input must be an object, got {}",
                    other
                )))
            }
        };
        fields.insert("action".to_string(), serde_json::Value::from(name));

        Self::parse(&serde_json::Value::Object(fields))
    }

    /// Check the structural constraints that the type system does not.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Action::TraceMouse(a) => require_path(&a.path),
            Action::DragMouse(a) => require_path(&a.path),
            Action::ClickMouse(a) if a.click_count < 1 => Err(EngineError::Validation(
                "clickCount must be at least 1".to_string(),
            )),
            Action::Scroll(a) if a.scroll_count < 1 => Err(EngineError::Validation(
                "scrollCount must be at least 1".to_string(),
            )),
            Action::TypeKeys(a) => require_millis("delay", a.delay),
            Action::TypeText(a) => require_millis("delay", a.delay),
            Action::Wait(a) => require_millis("duration", Some(a.duration)),
            _ => Ok(()),
        }
    }

    /// Whether the action carries text that must not be logged.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Action::TypeText(t) if t.is_sensitive.unwrap_or(false))
    }
}

/// Log-safe one-line description. Typed text is elided for sensitive input.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MoveMouse(a) => write!(f, "move_mouse to {}", a.coordinates),
            Action::TraceMouse(a) => write!(f, "trace_mouse over {} points", a.path.len()),
            Action::ClickMouse(a) => match a.coordinates {
                Some(c) => write!(f, "click_mouse {:?} x{} at {}", a.button, a.click_count, c),
                None => write!(f, "click_mouse {:?} x{}", a.button, a.click_count),
            },
            Action::PressMouse(a) => write!(f, "press_mouse {:?} {:?}", a.button, a.press),
            Action::DragMouse(a) => write!(f, "drag_mouse {:?} over {} points", a.button, a.path.len()),
            Action::Scroll(a) => write!(f, "scroll {:?} x{}", a.direction, a.scroll_count),
            Action::TypeKeys(a) => write!(f, "type_keys {}", a.keys.join("+")),
            Action::PressKeys(a) => write!(f, "press_keys {} {:?}", a.keys.join("+"), a.press),
            Action::TypeText(_) if self.is_sensitive() => write!(f, "type_text <redacted>"),
            Action::TypeText(a) => write!(f, "type_text {:?}", a.text),
            Action::Wait(a) => write!(f, "wait {}ms", a.duration),
            Action::Screenshot(_) => write!(f, "screenshot"),
            Action::CursorPosition(_) => write!(f, "cursor_position"),
        }
    }
}

fn require_path(path: &[Coordinates]) -> Result<(), EngineError> {
    if path.is_empty() {
        return Err(EngineError::Validation(
            "path must contain at least one point".to_string(),
        ));
    }
    Ok(())
}

fn require_millis(field: &str, value: Option<f64>) -> Result<(), EngineError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(EngineError::Validation(format!(
            "{} must be a non-negative number of milliseconds, got {}",
            field, v
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_click_mouse() {
        let action = Action::parse(&json!({
            "action": "click_mouse",
            "coordinates": {"x": 10, "y": 10},
            "button": "left",
            "clickCount": 1
        }))
        .unwrap();

        assert_eq!(
            action,
            Action::ClickMouse(ClickMouse {
                coordinates: Some(Coordinates::new(10, 10)),
                button: Button::Left,
                hold_keys: None,
                click_count: 1,
            })
        );
        assert_eq!(action.tool_name(), "computer_click_mouse");
    }

    #[test]
    fn test_zero_click_count_rejected() {
        let err = Action::parse(&json!({
            "action": "click_mouse",
            "button": "left",
            "clickCount": 0
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("clickCount")));
    }

    #[test]
    fn test_unknown_button_rejected() {
        let err = Action::parse(&json!({
            "action": "click_mouse",
            "button": "thumb",
            "clickCount": 1
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_fractional_coordinates_rejected() {
        let err = Action::parse(&json!({
            "action": "move_mouse",
            "coordinates": {"x": 10.5, "y": 3}
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = Action::parse(&json!({
            "action": "drag_mouse",
            "path": [],
            "button": "left"
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("path")));
    }

    #[test]
    fn test_negative_wait_rejected() {
        let err = Action::parse(&json!({"action": "wait", "duration": -5})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("duration")));
    }

    #[test]
    fn test_wait_duration_defaults() {
        let action = Action::from_tool_call("computer_wait", &json!({})).unwrap();
        assert_eq!(action, Action::Wait(Wait { duration: 500.0 }));
    }

    #[test]
    fn test_empty_keys_allowed() {
        let action = Action::parse(&json!({"action": "type_keys", "keys": []})).unwrap();
        assert_eq!(action.name(), "type_keys");
    }

    #[test]
    fn test_from_tool_call_fills_discriminator() {
        let action = Action::from_tool_call("computer_screenshot", &json!({})).unwrap();
        assert_eq!(action, Action::Screenshot(Screenshot {}));

        let action =
            Action::from_tool_call("computer_type_text", &json!({"text": "2+2"})).unwrap();
        assert!(matches!(action, Action::TypeText(ref t) if t.text == "2+2"));
    }

    #[test]
    fn test_from_tool_call_unknown_tool() {
        let err = Action::from_tool_call("computer_teleport", &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("computer_teleport")));

        let err = Action::from_tool_call("read_file", &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_sensitive_text_redacted_in_display() {
        let action = Action::TypeText(TypeText {
            text: "hunter2".to_string(),
            delay: None,
            is_sensitive: Some(true),
        });
        assert!(action.is_sensitive());
        assert!(!action.to_string().contains("hunter2"));
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let action = Action::Scroll(Scroll {
            coordinates: None,
            direction: ScrollDirection::Down,
            scroll_count: 3,
            hold_keys: Some(vec!["shift".to_string()]),
        });
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "scroll");
        assert_eq!(value["scrollCount"], 3);
        assert_eq!(value["holdKeys"][0], "shift");
        assert!(value.get("coordinates").is_none());
    }
}
