//! X11 input driver
//!
//! Drives the desktop with `xdotool` and captures it with ImageMagick's
//! `import`. Every action is one chained `xdotool` invocation, so held keys
//! are always released by the same process that pressed them.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sdk::action::{
    ClickMouse, DragMouse, MoveMouse, PressKeys, PressMouse, Scroll, TraceMouse, TypeKeys,
    TypeText,
};
use sdk::{Button, Coordinates, PressType, ScrollDirection};
use std::time::Duration;
use tracing::debug;

use super::InputDriver;

#[derive(Debug, Clone)]
pub struct XdotoolDriver {
    display: String,
    timeout: Duration,
}

impl XdotoolDriver {
    pub fn new(display: impl Into<String>, timeout: Duration) -> Self {
        Self {
            display: display.into(),
            timeout,
        }
    }

    async fn xdotool(&self, args: Vec<String>) -> Result<Vec<u8>> {
        self.run("xdotool", &args).await
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        // Arguments may carry typed text, so only the subcommand is logged
        debug!(
            program,
            subcommand = args.first().map(String::as_str).unwrap_or_default(),
            "Running desktop command"
        );

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .env("DISPLAY", &self.display)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("{} timed out after {}s", program, self.timeout.as_secs()))?
            .with_context(|| format!("Failed to execute {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} failed ({}): {}", program, output.status, stderr.trim());
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl InputDriver for XdotoolDriver {
    fn name(&self) -> &str {
        "xdotool"
    }

    async fn move_mouse(&self, action: &MoveMouse) -> Result<()> {
        self.xdotool(move_to(action.coordinates)).await?;
        Ok(())
    }

    async fn trace_mouse(&self, action: &TraceMouse) -> Result<()> {
        let mut body = Vec::new();
        for point in &action.path {
            body.extend(move_to(*point));
        }
        self.xdotool(holding(action.hold_keys.as_deref(), body)?)
            .await?;
        Ok(())
    }

    async fn click_mouse(&self, action: &ClickMouse) -> Result<()> {
        let mut body = action.coordinates.map(move_to).unwrap_or_default();
        body.extend(args(&[
            "click",
            "--repeat",
            &action.click_count.to_string(),
            button_number(action.button),
        ]));
        self.xdotool(holding(action.hold_keys.as_deref(), body)?)
            .await?;
        Ok(())
    }

    async fn press_mouse(&self, action: &PressMouse) -> Result<()> {
        let mut body = action.coordinates.map(move_to).unwrap_or_default();
        let verb = match action.press {
            PressType::Down => "mousedown",
            PressType::Up => "mouseup",
        };
        body.extend(args(&[verb, button_number(action.button)]));
        self.xdotool(body).await?;
        Ok(())
    }

    async fn drag_mouse(&self, action: &DragMouse) -> Result<()> {
        let Some((first, rest)) = action.path.split_first() else {
            bail!("drag path is empty");
        };
        let button = button_number(action.button);

        let mut body = move_to(*first);
        body.extend(args(&["mousedown", button]));
        for point in rest {
            body.extend(move_to(*point));
        }
        body.extend(args(&["mouseup", button]));
        self.xdotool(holding(action.hold_keys.as_deref(), body)?)
            .await?;
        Ok(())
    }

    async fn scroll(&self, action: &Scroll) -> Result<()> {
        let mut body = action.coordinates.map(move_to).unwrap_or_default();
        body.extend(args(&[
            "click",
            "--repeat",
            &action.scroll_count.to_string(),
            wheel_button(action.direction),
        ]));
        self.xdotool(holding(action.hold_keys.as_deref(), body)?)
            .await?;
        Ok(())
    }

    async fn type_keys(&self, action: &TypeKeys) -> Result<()> {
        if action.keys.is_empty() {
            return Ok(());
        }
        let delay = delay_args(action.delay);
        let keys = keysyms(&action.keys)?;

        // Press in order, release in reverse: a chord such as Ctrl+C
        let mut command = vec!["keydown".to_string()];
        command.extend(delay.iter().cloned());
        command.extend(keys.iter().cloned());
        command.push("keyup".to_string());
        command.extend(delay);
        command.extend(keys.into_iter().rev());

        self.xdotool(command).await?;
        Ok(())
    }

    async fn press_keys(&self, action: &PressKeys) -> Result<()> {
        if action.keys.is_empty() {
            return Ok(());
        }
        let verb = match action.press {
            PressType::Down => "keydown",
            PressType::Up => "keyup",
        };
        let mut command = vec![verb.to_string()];
        command.extend(keysyms(&action.keys)?);
        self.xdotool(command).await?;
        Ok(())
    }

    async fn type_text(&self, action: &TypeText) -> Result<()> {
        let mut command = vec!["type".to_string()];
        command.extend(delay_args(action.delay));
        command.push("--".to_string());
        command.push(action.text.clone());
        self.xdotool(command).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let png = self
            .run("import", &args(&["-window", "root", "png:-"]))
            .await?;
        if png.is_empty() {
            bail!("import produced no image data");
        }
        Ok(png)
    }

    async fn cursor_position(&self) -> Result<Coordinates> {
        let stdout = self
            .xdotool(args(&["getmouselocation", "--shell"]))
            .await?;
        parse_mouse_location(&String::from_utf8_lossy(&stdout))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Root window coordinates start at 0; a negative value would also be
/// read by xdotool as an option.
fn move_to(point: Coordinates) -> Vec<String> {
    vec![
        "mousemove".to_string(),
        "--sync".to_string(),
        point.x.max(0).to_string(),
        point.y.max(0).to_string(),
    ]
}

/// Wrap `body` in keydown/keyup of the held keys.
fn holding(hold_keys: Option<&[String]>, body: Vec<String>) -> Result<Vec<String>> {
    let keys = keysyms(hold_keys.unwrap_or_default())?;
    if keys.is_empty() {
        return Ok(body);
    }

    let mut command = vec!["keydown".to_string()];
    command.extend(keys.iter().cloned());
    command.extend(body);
    command.push("keyup".to_string());
    command.extend(keys.into_iter().rev());
    Ok(command)
}

fn delay_args(delay: Option<f64>) -> Vec<String> {
    match delay {
        Some(ms) => vec!["--delay".to_string(), format!("{}", ms.round() as u64)],
        None => Vec::new(),
    }
}

fn button_number(button: Button) -> &'static str {
    match button {
        Button::Left => "1",
        Button::Middle => "2",
        Button::Right => "3",
    }
}

fn wheel_button(direction: ScrollDirection) -> &'static str {
    match direction {
        ScrollDirection::Up => "4",
        ScrollDirection::Down => "5",
        ScrollDirection::Left => "6",
        ScrollDirection::Right => "7",
    }
}

fn keysyms(names: &[String]) -> Result<Vec<String>> {
    names.iter().map(|name| keysym(name)).collect()
}

/// Map a key name from the tool vocabulary to an X keysym.
pub fn keysym(name: &str) -> Result<String> {
    let mapped = match name {
        // Handled by keyboard firmware, never seen by X
        "Fn" => bail!("key Fn cannot be sent through X11"),
        "Enter" | "Return" => "Return",
        "Escape" => "Escape",
        "Backspace" => "BackSpace",
        "Tab" => "Tab",
        "Space" => "space",
        "Delete" => "Delete",
        "Insert" => "Insert",
        "Home" => "Home",
        "End" => "End",
        "PageUp" => "Prior",
        "PageDown" => "Next",
        "Up" | "Down" | "Left" | "Right" => name,
        "LeftControl" | "Control" | "control" | "ctrl" => "Control_L",
        "RightControl" => "Control_R",
        "LeftShift" | "Shift" | "shift" => "Shift_L",
        "RightShift" => "Shift_R",
        "LeftAlt" | "Alt" | "alt" => "Alt_L",
        "RightAlt" => "Alt_R",
        "LeftSuper" | "LeftWin" | "LeftCmd" | "Super" | "super" => "Super_L",
        "RightSuper" | "RightWin" | "RightCmd" => "Super_R",
        "Menu" => "Menu",
        "CapsLock" => "Caps_Lock",
        "NumLock" => "Num_Lock",
        "ScrollLock" => "Scroll_Lock",
        "Print" => "Print",
        "Pause" => "Pause",
        "Clear" => "Clear",
        "Minus" => "minus",
        "Equal" => "equal",
        "Comma" => "comma",
        "Period" => "period",
        "Slash" => "slash",
        "Backslash" => "backslash",
        "Semicolon" => "semicolon",
        "Quote" => "apostrophe",
        "Grave" => "grave",
        "LeftBracket" => "bracketleft",
        "RightBracket" => "bracketright",
        "Add" => "KP_Add",
        "Subtract" => "KP_Subtract",
        "Multiply" => "KP_Multiply",
        "Divide" => "KP_Divide",
        "Decimal" => "KP_Decimal",
        "AudioMute" => "XF86AudioMute",
        "AudioVolUp" => "XF86AudioRaiseVolume",
        "AudioVolDown" => "XF86AudioLowerVolume",
        "AudioPlay" => "XF86AudioPlay",
        "AudioPause" => "XF86AudioPause",
        "AudioStop" => "XF86AudioStop",
        "AudioNext" => "XF86AudioNext",
        "AudioPrev" => "XF86AudioPrev",
        "AudioForward" => "XF86AudioForward",
        "AudioRewind" => "XF86AudioRewind",
        "AudioRandom" => "XF86AudioRandomPlay",
        "AudioRepeat" => "XF86AudioRepeat",
        other => {
            if let Some(digit) = other
                .strip_prefix("NumPad")
                .or_else(|| other.strip_prefix("Num"))
                .filter(|d| d.len() == 1 && d.chars().all(|c| c.is_ascii_digit()))
            {
                return Ok(format!("KP_{}", digit));
            }
            // Single letters are lowercase keysyms; F1..F24 and the rest pass through
            if other.len() == 1 {
                return Ok(other.to_ascii_lowercase());
            }
            other
        }
    };
    Ok(mapped.to_string())
}

/// Parse `xdotool getmouselocation --shell` output.
pub fn parse_mouse_location(output: &str) -> Result<Coordinates> {
    let mut x = None;
    let mut y = None;
    for line in output.lines() {
        if let Some(value) = line.trim().strip_prefix("X=") {
            x = value.parse::<i32>().ok();
        } else if let Some(value) = line.trim().strip_prefix("Y=") {
            y = value.parse::<i32>().ok();
        }
    }

    match (x, y) {
        (Some(x), Some(y)) => Ok(Coordinates::new(x, y)),
        _ => Err(anyhow!("Unexpected getmouselocation output: {:?}", output)),
    }
}
