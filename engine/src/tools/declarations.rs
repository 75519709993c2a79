//! Tool declarations advertised to the model

use serde_json::{json, Value};

use crate::llm::ToolDeclaration;

const VALID_KEYS: &str = "\
VALID KEYS
A, Add, AudioForward, AudioMute, AudioNext, AudioPause, AudioPlay, AudioPrev, AudioRandom, AudioRepeat, AudioRewind, AudioStop, AudioVolDown, AudioVolUp,
B, Backslash, Backspace,
C, CapsLock, Clear, Comma,
D, Decimal, Delete, Divide, Down,
E, End, Enter, Equal, Escape, F,
F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12, F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
G, Grave,
H, Home,
I, Insert,
J, K, L, Left, LeftAlt, LeftBracket, LeftCmd, LeftControl, LeftShift, LeftSuper, LeftWin,
M, Menu, Minus, Multiply,
N, Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9, NumLock,
NumPad0, NumPad1, NumPad2, NumPad3, NumPad4, NumPad5, NumPad6, NumPad7, NumPad8, NumPad9,
O, P, PageDown, PageUp, Pause, Period, Print,
Q, Quote,
R, Return, Right, RightAlt, RightBracket, RightCmd, RightControl, RightShift, RightSuper, RightWin,
S, ScrollLock, Semicolon, Slash, Space, Subtract,
T, Tab,
U, Up,
V, W, X, Y, Z";

fn point(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "x": {"type": "integer", "description": format!("The x-coordinate {}.", what)},
            "y": {"type": "integer", "description": format!("The y-coordinate {}.", what)}
        },
        "required": ["x", "y"]
    })
}

fn with_description(mut schema: Value, description: &str) -> Value {
    if let Value::Object(map) = &mut schema {
        map.insert("description".to_string(), json!(description));
    }
    schema
}

fn button(description: &str) -> Value {
    json!({"type": "string", "enum": ["left", "right", "middle"], "description": description})
}

fn press(description: &str) -> Value {
    json!({"type": "string", "enum": ["down", "up"], "description": description})
}

fn hold_keys(during: &str) -> Value {
    json!({
        "type": "array",
        "items": {"type": "string"},
        "description": format!("Optional array of keys to hold during the {}.", during)
    })
}

fn delay() -> Value {
    json!({"type": "number", "minimum": 0, "description": "Optional delay in milliseconds between key presses."})
}

fn declaration(name: &str, description: impl Into<String>, input_schema: Value) -> ToolDeclaration {
    ToolDeclaration {
        name: name.to_string(),
        description: description.into(),
        input_schema,
        cache_control: None,
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({"type": "object", "properties": properties, "required": required})
}

/// Declarations for all twelve computer tools, in action order.
pub fn computer_tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        declaration(
            "computer_move_mouse",
            "Moves the mouse cursor to the specified coordinates.",
            object(
                json!({"coordinates": point("to move the mouse to")}),
                &["coordinates"],
            ),
        ),
        declaration(
            "computer_trace_mouse",
            "Moves the mouse cursor along a specified path of coordinates.",
            object(
                json!({
                    "path": {
                        "type": "array",
                        "items": point("to move the mouse to"),
                        "minItems": 1,
                        "description": "An array of coordinate objects representing the path."
                    },
                    "holdKeys": hold_keys("trace")
                }),
                &["path"],
            ),
        ),
        declaration(
            "computer_click_mouse",
            "Performs a mouse click at the specified coordinates or current position.",
            object(
                json!({
                    "coordinates": with_description(
                        point("to move the mouse to"),
                        "Optional coordinates for the click. If not provided, clicks at the current mouse position."
                    ),
                    "button": button("The mouse button to click."),
                    "holdKeys": hold_keys("click"),
                    "clickCount": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of clicks to perform (e.g., 2 for double-click)."
                    }
                }),
                &["button", "clickCount"],
            ),
        ),
        declaration(
            "computer_press_mouse",
            "Presses or releases a specified mouse button at the given coordinates or current position.",
            object(
                json!({
                    "coordinates": with_description(
                        point("for the mouse action"),
                        "Optional coordinates for the mouse press/release. If not provided, uses the current mouse position."
                    ),
                    "button": button("The mouse button to press or release."),
                    "press": press("The action to perform (press or release).")
                }),
                &["button", "press"],
            ),
        ),
        declaration(
            "computer_drag_mouse",
            "Drags the mouse from a starting point along a path while holding a specified button.",
            object(
                json!({
                    "path": {
                        "type": "array",
                        "items": point("of a point in the drag path"),
                        "minItems": 1,
                        "description": "An array of coordinate objects representing the drag path. The first coordinate is the start point."
                    },
                    "button": button("The mouse button to hold while dragging."),
                    "holdKeys": hold_keys("drag")
                }),
                &["path", "button"],
            ),
        ),
        declaration(
            "computer_scroll",
            "Scrolls the mouse wheel up, down, left, or right.",
            object(
                json!({
                    "coordinates": with_description(
                        point("for the scroll action"),
                        "Coordinates for where the scroll should occur. Behavior might depend on the OS/application."
                    ),
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down", "left", "right"],
                        "description": "The direction to scroll the mouse wheel."
                    },
                    "scrollCount": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "The number of times to scroll the mouse wheel."
                    },
                    "holdKeys": hold_keys("scroll")
                }),
                &["direction", "scrollCount"],
            ),
        ),
        declaration(
            "computer_type_keys",
            format!(
                "Simulates typing a sequence of keys, often used for shortcuts involving modifier keys (e.g., Ctrl+C). Presses each key in order and releases them in reverse.\n\n{}",
                VALID_KEYS
            ),
            object(
                json!({
                    "keys": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "An array of key names to type in sequence (e.g., [\"LeftControl\", \"C\"])."
                    },
                    "delay": delay()
                }),
                &["keys"],
            ),
        ),
        declaration(
            "computer_press_keys",
            format!(
                "Simulates pressing down or releasing specific keys. Useful for holding modifier keys.\n\n{}",
                VALID_KEYS
            ),
            object(
                json!({
                    "keys": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "An array of key names to press or release (e.g., [\"LeftShift\"])."
                    },
                    "press": press("Whether to press the keys down or release them up.")
                }),
                &["keys", "press"],
            ),
        ),
        declaration(
            "computer_type_text",
            "Simulates typing a string of text character by character.",
            object(
                json!({
                    "text": {"type": "string", "description": "The text string to type."},
                    "delay": delay(),
                    "isSensitive": {
                        "type": "boolean",
                        "description": "Set for passwords and other secrets so the text is never logged."
                    }
                }),
                &["text"],
            ),
        ),
        declaration(
            "computer_wait",
            "Pauses execution for a specified duration.",
            object(
                json!({
                    "duration": {
                        "type": "number",
                        "minimum": 0,
                        "default": 500,
                        "description": "The duration to wait in milliseconds."
                    }
                }),
                &[],
            ),
        ),
        declaration(
            "computer_screenshot",
            "Captures a screenshot of the current screen.",
            object(json!({}), &[]),
        ),
        declaration(
            "computer_cursor_position",
            "Gets the current (x, y) coordinates of the mouse cursor.",
            object(json!({}), &[]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::xdotool::keysym;
    use sdk::Action;

    #[test]
    fn test_one_declaration_per_action() {
        let names: Vec<String> = computer_tool_declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        let expected: Vec<String> = Action::NAMES
            .iter()
            .map(|n| format!("computer_{}", n))
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_key_tools_list_valid_keys() {
        let declarations = computer_tool_declarations();
        for name in ["computer_type_keys", "computer_press_keys"] {
            let d = declarations.iter().find(|d| d.name == name).unwrap();
            assert!(d.description.contains("VALID KEYS"));
            assert!(d.description.contains("LeftControl"));
        }
    }

    #[test]
    fn test_every_listed_key_maps_to_a_keysym() {
        let keys: Vec<&str> = VALID_KEYS
            .lines()
            .skip(1)
            .flat_map(|line| line.split(','))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        assert!(keys.len() > 100);
        assert!(!keys.contains(&"Fn"));
        for key in keys {
            assert!(keysym(key).is_ok(), "{} is listed but not mappable", key);
        }
    }

    #[test]
    fn test_schemas_are_objects() {
        for d in computer_tool_declarations() {
            assert_eq!(d.input_schema["type"], "object", "{}", d.name);
            assert!(d.cache_control.is_none());
        }
    }
}
