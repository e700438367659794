use serde::{Deserialize, Serialize};

use crate::executor::coordinator::clamp;

/// Bounds every coordinate axis the model may emit.
pub const COORD_LIMIT: f64 = 100_000.0;

/// Termination signal reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    InProgress,
    Completed,
    /// The model reports the task cannot proceed.
    Blocked,
}

impl Completion {
    /// Maps the wire value of `whether_completed`.
    ///
    /// `"True"` (any case, or a JSON `true`) completes, `"difficult"` blocks,
    /// anything else keeps the loop running.
    pub fn from_wire(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(true) => Completion::Completed,
            serde_json::Value::String(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Completion::Completed
                } else if s.eq_ignore_ascii_case("difficult") {
                    Completion::Blocked
                } else {
                    Completion::InProgress
                }
            }
            _ => Completion::InProgress,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Completion::InProgress => "False",
            Completion::Completed => "True",
            Completion::Blocked => "difficult",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    DoubleClick,
    LongPress,
    RightClick,
    ScrollUp,
    ScrollDown,
    Drag,
    Hotkey,
    PageLoading,
    Unknown,
}

impl ActionKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "double_click" => ActionKind::DoubleClick,
            "long_press" => ActionKind::LongPress,
            "right_click" => ActionKind::RightClick,
            "scroll_up" => ActionKind::ScrollUp,
            "scroll_down" => ActionKind::ScrollDown,
            "drag" => ActionKind::Drag,
            "hotkey" => ActionKind::Hotkey,
            "page_loading" => ActionKind::PageLoading,
            _ => ActionKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::LongPress => "long_press",
            ActionKind::RightClick => "right_click",
            ActionKind::ScrollUp => "scroll_up",
            ActionKind::ScrollDown => "scroll_down",
            ActionKind::Drag => "drag",
            ActionKind::Hotkey => "hotkey",
            ActionKind::PageLoading => "page_loading",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point on the model's normalized 0–1000 grid (or raw image pixels when
/// the image size is unknown).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp(x),
            y: clamp(y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coordinates {
    Point(Point),
    /// Drag start and end.
    Pair(Point, Point),
}

impl Coordinates {
    /// Wire form: `[x, y]` or `[[x1, y1], [x2, y2]]`.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Coordinates::Point(p) => serde_json::json!([p.x, p.y]),
            Coordinates::Pair(a, b) => serde_json::json!([[a.x, a.y], [b.x, b.y]]),
        }
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Coordinates::Point(Point::new(0.0, 0.0))
    }
}

/// The typed result of one decision round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub status: String,
    pub completion: Completion,
    pub target_description: String,
    pub coordinates: Coordinates,
    pub action: ActionKind,
    /// Text to paste, or the key combination when `action` is `hotkey`.
    pub text: String,
}

impl ActionDescriptor {
    /// The descriptor in the model's own field names, used when feeding it
    /// back as history.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "current_status": self.status,
            "whether_completed": self.completion.as_wire(),
            "element_info": self.target_description,
            "coordinates": self.coordinates.to_wire(),
            "action": self.action.as_str(),
            "type_information": self.text,
        })
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Complete,
    Blocked,
    Cancelled,
    Error,
    MaxIterations,
}

/// Lifecycle of one control-loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Running { iteration: u32 },
    Terminated { reason: TerminalState },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Terminated { .. })
    }
}

/// Status returned when the cancellation flag stops the loop.
pub const CANCELLED_STATUS: &str = "Task interrupted by user";

/// Status reported before the model has said anything.
pub const INITIAL_STATUS: &str = "Not completed";

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub terminal: TerminalState,
    /// Last status reported by the model, or a sentinel.
    pub status: String,
    /// Non-fatal failures in the order they happened.
    pub errors: Vec<String>,
    /// Iterations started, including the one that terminated the loop.
    pub iterations: u32,
}

impl LoopOutcome {
    /// Status with accumulated errors appended, ready for display.
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            return self.status.clone();
        }
        format!(
            "{}\nErrors during the control loop:\n{}",
            self.status,
            self.errors.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_wire_values() {
        use serde_json::json;
        assert_eq!(Completion::from_wire(&json!("True")), Completion::Completed);
        assert_eq!(Completion::from_wire(&json!("true")), Completion::Completed);
        assert_eq!(Completion::from_wire(&json!(true)), Completion::Completed);
        assert_eq!(Completion::from_wire(&json!("difficult")), Completion::Blocked);
        assert_eq!(Completion::from_wire(&json!("False")), Completion::InProgress);
        assert_eq!(Completion::from_wire(&json!(null)), Completion::InProgress);
    }

    #[test]
    fn unknown_action_names_fall_back() {
        assert_eq!(ActionKind::parse("DOUBLE_CLICK"), ActionKind::DoubleClick);
        assert_eq!(ActionKind::parse("swipe"), ActionKind::Unknown);
    }

    #[test]
    fn points_are_clamped() {
        let p = Point::new(250_000.0, -300_000.0);
        assert_eq!(p, Point { x: 100_000.0, y: -100_000.0 });
        assert_eq!(Point::new(f64::NAN, 1.0).x, 0.0);
    }

    #[test]
    fn outcome_message_appends_errors() {
        let mut outcome = LoopOutcome {
            terminal: TerminalState::MaxIterations,
            status: "searching".into(),
            errors: Vec::new(),
            iterations: 3,
        };
        assert_eq!(outcome.message(), "searching");
        outcome.errors.push("iteration 1: 429".into());
        outcome.errors.push("iteration 2: 429".into());
        assert_eq!(
            outcome.message(),
            "searching\nErrors during the control loop:\niteration 1: 429\niteration 2: 429"
        );
    }
}
