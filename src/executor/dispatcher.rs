// Action executor: turns a decoded action into input-device operations.
use serde::{Deserialize, Serialize};

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::state::{ActionDescriptor, ActionKind, Coordinates, Point};
use crate::config::{DelaysConfig, MouseConfig};
use crate::errors::{PilotError, PilotResult};
use crate::executor::coordinator::{point_to_screen, ScreenPoint};
use crate::executor::hotkey::{describe_combo, translate_hotkey, Platform};
use crate::executor::input::{press_combo, ButtonAction, InputDevice, MouseButton};
use crate::executor::safety::check_failsafe;
use crate::executor::text_input::{paste_and_submit, settle};
use crate::perception::types::CaptureResult;

/// What was actually done, for history and the audit overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// One-line description fed back to the model next iteration.
    pub summary: String,
    /// Screen pixels acted on, in order (empty for keyboard-only actions).
    pub mapped: Vec<ScreenPoint>,
}

pub struct ActionExecutor {
    device: Box<dyn InputDevice>,
    mouse: MouseConfig,
    delays: DelaysConfig,
    platform: Platform,
}

impl ActionExecutor {
    pub fn new(device: Box<dyn InputDevice>, mouse: MouseConfig, delays: DelaysConfig) -> Self {
        Self {
            device,
            mouse,
            delays,
            platform: Platform::current(),
        }
    }

    /// Override the detected platform (hotkey aliases, paste shortcut).
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub async fn execute(
        &mut self,
        action: &ActionDescriptor,
        capture: &CaptureResult,
        events: &EventBus,
    ) -> PilotResult<ExecutionReport> {
        check_failsafe(self.device.as_ref(), self.mouse.failsafe)?;

        let kind = action.action;
        tracing::info!(action = %kind, target = %action.target_description, "executing action");

        let mut mapped = Vec::new();
        let mut summary = match kind {
            ActionKind::PageLoading => {
                settle(self.delays.page_loading_ms).await;
                return Ok(ExecutionReport {
                    summary: "page_loading: waited for the page to load".into(),
                    mapped,
                });
            }
            ActionKind::Hotkey => {
                let keys = translate_hotkey(&action.text, self.platform)?;
                press_combo(self.device.as_mut(), &keys)?;
                format!("hotkey {}", describe_combo(&keys, self.platform))
            }
            ActionKind::Drag => {
                let (from, to) = match action.coordinates {
                    Coordinates::Pair(a, b) => (a, b),
                    Coordinates::Point(_) => {
                        return Err(PilotError::InvalidActionShape {
                            action: kind.to_string(),
                            detail: "drag needs a start and an end point".into(),
                        })
                    }
                };
                let start = point_to_screen(from, capture);
                let end = point_to_screen(to, capture);
                events.coordinate(start.x, start.y);
                events.coordinate(end.x, end.y);

                self.device
                    .move_to(start.x, start.y, self.mouse.move_duration())?;
                self.device.drag(
                    (start.x, start.y),
                    (end.x, end.y),
                    self.mouse.drag_duration(),
                )?;
                mapped.push(start);
                mapped.push(end);
                format!(
                    "drag from ({:.0}, {:.0}) to ({:.0}, {:.0})",
                    start.x, start.y, end.x, end.y
                )
            }
            ActionKind::Click
            | ActionKind::DoubleClick
            | ActionKind::LongPress
            | ActionKind::RightClick
            | ActionKind::ScrollUp
            | ActionKind::ScrollDown => {
                let point = single_point(action)?;
                let target = point_to_screen(point, capture);
                events.coordinate(target.x, target.y);

                self.device
                    .move_to(target.x, target.y, self.mouse.move_duration())?;
                self.pointer_event(kind).await?;
                mapped.push(target);
                format!("{kind} at ({:.0}, {:.0})", target.x, target.y)
            }
            ActionKind::Unknown => {
                tracing::warn!(status = %action.status, "unknown action, no input issued");
                "unknown: no input issued".to_string()
            }
        };

        settle(self.delays.after_action_ms).await;

        if !action.text.is_empty() && kind != ActionKind::Hotkey {
            paste_and_submit(self.device.as_mut(), &action.text, self.platform, &self.delays)
                .await?;
            summary.push_str(&format!(", then typed \"{}\" and pressed enter", action.text));
        }

        self.park().await?;
        Ok(ExecutionReport { summary, mapped })
    }

    async fn pointer_event(&mut self, kind: ActionKind) -> PilotResult<()> {
        let device = self.device.as_mut();
        match kind {
            ActionKind::Click => device.button(MouseButton::Left, ButtonAction::Click),
            ActionKind::DoubleClick => device.button(MouseButton::Left, ButtonAction::DoubleClick),
            ActionKind::RightClick => device.button(MouseButton::Right, ButtonAction::Click),
            ActionKind::LongPress => {
                device.button(MouseButton::Left, ButtonAction::Press)?;
                settle(self.mouse.long_press_ms).await;
                self.device
                    .button(MouseButton::Left, ButtonAction::Release)
            }
            ActionKind::ScrollUp => device.scroll(self.mouse.scroll_amount),
            ActionKind::ScrollDown => device.scroll(-self.mouse.scroll_amount),
            _ => Ok(()),
        }
    }

    /// Move to the neutral position so hover effects do not leak into the
    /// next capture.
    async fn park(&mut self) -> PilotResult<()> {
        let [x, y] = self.mouse.park_position;
        self.device
            .move_to(x as f64, y as f64, self.mouse.move_duration())?;
        settle(self.delays.after_park_ms).await;
        Ok(())
    }
}

fn single_point(action: &ActionDescriptor) -> PilotResult<Point> {
    match action.coordinates {
        Coordinates::Point(p) => Ok(p),
        Coordinates::Pair(..) => Err(PilotError::InvalidActionShape {
            action: action.action.to_string(),
            detail: "expected a single point, got a pair".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::agent_engine::event_bus::LoopEvent;
    use crate::agent_engine::state::Completion;
    use crate::executor::hotkey::KeyToken;
    use crate::executor::input::KeyDirection;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Move(f64, f64),
        Button(MouseButton, ButtonAction),
        Scroll(i32),
        Key(KeyToken, KeyDirection),
        Stage(String),
        Drag((f64, f64), (f64, f64)),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        ops: Arc<Mutex<Vec<Op>>>,
        cursor: (f64, f64),
    }

    impl Recorder {
        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }
        fn push(&self, op: Op) {
            self.ops.lock().unwrap().push(op);
        }
    }

    impl InputDevice for Recorder {
        fn move_to(&mut self, x: f64, y: f64, _: Duration) -> PilotResult<()> {
            self.push(Op::Move(x, y));
            Ok(())
        }
        fn button(&mut self, b: MouseButton, a: ButtonAction) -> PilotResult<()> {
            self.push(Op::Button(b, a));
            Ok(())
        }
        fn scroll(&mut self, delta: i32) -> PilotResult<()> {
            self.push(Op::Scroll(delta));
            Ok(())
        }
        fn key(&mut self, key: KeyToken, dir: KeyDirection) -> PilotResult<()> {
            self.push(Op::Key(key, dir));
            Ok(())
        }
        fn stage_text(&mut self, text: &str) -> PilotResult<()> {
            self.push(Op::Stage(text.to_string()));
            Ok(())
        }
        fn drag(&mut self, from: (f64, f64), to: (f64, f64), _: Duration) -> PilotResult<()> {
            self.push(Op::Drag(from, to));
            Ok(())
        }
        fn cursor_position(&self) -> PilotResult<(f64, f64)> {
            Ok(self.cursor)
        }
    }

    fn capture() -> CaptureResult {
        CaptureResult {
            path: "imgs/screen.png".into(),
            scale: 0.5,
            width: 1000,
            height: 500,
            screen_width: 2000,
            screen_height: 1000,
            png_bytes: Vec::new(),
        }
    }

    fn descriptor(action: ActionKind, coordinates: Coordinates, text: &str) -> ActionDescriptor {
        ActionDescriptor {
            status: "working".into(),
            completion: Completion::InProgress,
            target_description: "button".into(),
            coordinates,
            action,
            text: text.into(),
        }
    }

    fn executor(rec: &Recorder, mouse: MouseConfig) -> ActionExecutor {
        ActionExecutor::new(Box::new(rec.clone()), mouse, DelaysConfig::none())
            .with_platform(Platform::Windows)
    }

    #[tokio::test]
    async fn click_maps_moves_clicks_and_parks() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());
        let (bus, mut rx) = EventBus::new(8);

        let action = descriptor(
            ActionKind::Click,
            Coordinates::Point(Point::new(500.0, 500.0)),
            "",
        );
        let report = exec.execute(&action, &capture(), &bus).await.unwrap();

        // 500/1000 * 1000 / 0.5 = 1000 ; 500/1000 * 500 / 0.5 = 500
        assert_eq!(report.mapped, vec![ScreenPoint { x: 1000.0, y: 500.0 }]);
        assert_eq!(report.summary, "click at (1000, 500)");
        assert_eq!(
            rec.ops(),
            vec![
                Op::Move(1000.0, 500.0),
                Op::Button(MouseButton::Left, ButtonAction::Click),
                Op::Move(0.0, 0.0),
            ]
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(LoopEvent::Coordinate { x, y }) if x == 1000.0 && y == 500.0
        ));
    }

    #[tokio::test]
    async fn text_is_pasted_and_submitted_after_click() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());
        let action = descriptor(
            ActionKind::Click,
            Coordinates::Point(Point::new(0.0, 0.0)),
            "天气",
        );
        exec.execute(&action, &capture(), &EventBus::disabled())
            .await
            .unwrap();

        let ops = rec.ops();
        assert_eq!(ops[2], Op::Stage("天气".into()));
        assert_eq!(ops[3], Op::Key(KeyToken::Control, KeyDirection::Press));
        assert_eq!(ops[4], Op::Key(KeyToken::Char('v'), KeyDirection::Press));
        assert_eq!(ops[7], Op::Key(KeyToken::Return, KeyDirection::Tap));
        assert_eq!(ops.last(), Some(&Op::Move(0.0, 0.0)));
    }

    #[tokio::test]
    async fn hotkey_text_is_not_pasted() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());
        let action = descriptor(ActionKind::Hotkey, Coordinates::default(), "meta r");
        let report = exec
            .execute(&action, &capture(), &EventBus::disabled())
            .await
            .unwrap();

        assert_eq!(report.summary, "hotkey win+r");
        assert!(report.mapped.is_empty());
        let ops = rec.ops();
        assert!(!ops.iter().any(|op| matches!(op, Op::Stage(_))));
        assert_eq!(ops[0], Op::Key(KeyToken::Meta, KeyDirection::Press));
        assert_eq!(ops.len(), 5);
    }

    #[tokio::test]
    async fn drag_notifies_both_endpoints() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());
        let (bus, mut rx) = EventBus::new(8);
        let action = descriptor(
            ActionKind::Drag,
            Coordinates::Pair(Point::new(100.0, 100.0), Point::new(200.0, 400.0)),
            "",
        );
        let report = exec.execute(&action, &capture(), &bus).await.unwrap();

        assert_eq!(report.mapped.len(), 2);
        assert_eq!(
            rec.ops()[..2],
            [
                Op::Move(200.0, 100.0),
                Op::Drag((200.0, 100.0), (400.0, 400.0)),
            ]
        );
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            rx.try_recv(),
            Ok(LoopEvent::Coordinate { x, y }) if x == 400.0 && y == 400.0
        ));
    }

    #[tokio::test]
    async fn shape_mismatch_is_rejected_before_input() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());

        let drag = descriptor(ActionKind::Drag, Coordinates::default(), "");
        let err = exec
            .execute(&drag, &capture(), &EventBus::disabled())
            .await
            .unwrap_err();
        assert!(err.is_malformed_response());

        let click = descriptor(
            ActionKind::Click,
            Coordinates::Pair(Point::new(1.0, 1.0), Point::new(2.0, 2.0)),
            "",
        );
        assert!(exec
            .execute(&click, &capture(), &EventBus::disabled())
            .await
            .is_err());
        assert!(rec.ops().is_empty());
    }

    #[tokio::test]
    async fn page_loading_and_unknown_issue_no_pointer_input() {
        let rec = Recorder::default();
        let mut exec = executor(&rec, MouseConfig::default());

        let wait = descriptor(ActionKind::PageLoading, Coordinates::default(), "ignored");
        exec.execute(&wait, &capture(), &EventBus::disabled())
            .await
            .unwrap();
        assert!(rec.ops().is_empty());

        let unknown = descriptor(ActionKind::Unknown, Coordinates::default(), "");
        exec.execute(&unknown, &capture(), &EventBus::disabled())
            .await
            .unwrap();
        assert_eq!(rec.ops(), vec![Op::Move(0.0, 0.0)]);
    }

    #[tokio::test]
    async fn scroll_and_long_press() {
        let rec = Recorder::default();
        let mouse = MouseConfig {
            scroll_amount: 3,
            long_press_ms: 0,
            ..MouseConfig::default()
        };
        let mut exec = executor(&rec, mouse);
        let at = Coordinates::Point(Point::new(10.0, 10.0));

        for kind in [ActionKind::ScrollDown, ActionKind::LongPress] {
            exec.execute(&descriptor(kind, at, ""), &capture(), &EventBus::disabled())
                .await
                .unwrap();
        }
        let ops = rec.ops();
        assert_eq!(ops[1], Op::Scroll(-3));
        assert_eq!(ops[4], Op::Button(MouseButton::Left, ButtonAction::Press));
        assert_eq!(ops[5], Op::Button(MouseButton::Left, ButtonAction::Release));
    }

    #[tokio::test]
    async fn failsafe_refuses_in_corner() {
        let rec = Recorder::default();
        let mouse = MouseConfig {
            failsafe: true,
            ..MouseConfig::default()
        };
        let mut exec = executor(&rec, mouse);
        let action = descriptor(ActionKind::Click, Coordinates::default(), "");
        let err = exec
            .execute(&action, &capture(), &EventBus::disabled())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(rec.ops().is_empty());
    }
}
