use std::sync::Arc;

use serde_json::{Map, Value};

use crate::agent_engine::state::{ActionDescriptor, ActionKind, Completion, Coordinates, Point};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::DecisionTransport;
use crate::llm::response_parser::parse_action_json;
use crate::llm::types::DecisionRequest;
use crate::perception::types::CaptureResult;

const UNKNOWN: &str = "unknown";

/// Result of one decision round.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Action(ActionDescriptor),
    /// No call was made or nothing came back; the loop moves on.
    Skipped(String),
}

/// Builds the per-iteration request and turns the reply into an action.
pub struct DecisionClient {
    transport: Arc<dyn DecisionTransport>,
    system_prompt: String,
    has_credential: bool,
}

impl DecisionClient {
    pub fn new(
        transport: Arc<dyn DecisionTransport>,
        system_prompt: String,
        has_credential: bool,
    ) -> Self {
        Self {
            transport,
            system_prompt,
            has_credential,
        }
    }

    /// Ask the decision service for the next action.
    ///
    /// Transport failures propagate; a missing credential or an empty reply
    /// is a skip. Unparseable replies are `MalformedResponse` /
    /// `InvalidActionShape` errors.
    pub async fn decide(
        &self,
        capture: &CaptureResult,
        user_content: String,
    ) -> PilotResult<DecisionOutcome> {
        if !self.has_credential {
            tracing::warn!("no API credential configured, skipping decision call");
            return Ok(DecisionOutcome::Skipped("no API credential configured".into()));
        }

        let request = DecisionRequest {
            system_instruction: self.system_prompt.clone(),
            image_data_url: capture.data_url(),
            user_content,
        };
        tracing::debug!(
            transport = self.transport.name(),
            image = %format!("{}×{}", capture.width, capture.height),
            "requesting decision"
        );

        let raw = self.transport.complete(request).await?;
        if raw.trim().is_empty() {
            return Ok(DecisionOutcome::Skipped("empty response".into()));
        }

        let object = parse_action_json(&raw)?;
        decode_descriptor(&object).map(DecisionOutcome::Action)
    }
}

/// Context text for one request: prior outputs, what was executed last,
/// then the task.
pub fn build_user_content(history: &str, last_executed: Option<&str>, task: &str) -> String {
    if history.is_empty() && last_executed.is_none() {
        return task.to_string();
    }
    let mut out = String::new();
    if !history.is_empty() {
        out.push_str("Previous model outputs (most recent first):\n");
        out.push_str(history);
        out.push('\n');
    }
    if let Some(summary) = last_executed {
        out.push_str("Action executed last iteration: ");
        out.push_str(summary);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(task);
    out
}

/// Map a decoded reply onto an [`ActionDescriptor`], filling absent fields
/// with defaults.
pub fn decode_descriptor(object: &Map<String, Value>) -> PilotResult<ActionDescriptor> {
    let action = object
        .get("action")
        .and_then(Value::as_str)
        .map(ActionKind::parse)
        .unwrap_or(ActionKind::Unknown);

    // A reply that never says whether it is done is treated as stuck.
    let completion = object
        .get("whether_completed")
        .map(Completion::from_wire)
        .unwrap_or(Completion::Blocked);

    let coordinates = match object.get("coordinates") {
        None | Some(Value::Null) => Coordinates::default(),
        Some(value) => parse_coordinates(value)?,
    };
    validate_shape(action, &coordinates)?;

    Ok(ActionDescriptor {
        status: text_field(object, "current_status").unwrap_or_else(|| UNKNOWN.into()),
        completion,
        target_description: text_field(object, "element_info").unwrap_or_else(|| UNKNOWN.into()),
        coordinates,
        action,
        text: text_field(object, "type_information").unwrap_or_default(),
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Accepts `[x, y]`, `[[x1, y1], [x2, y2]]`, a flat `[x1, y1, x2, y2]`, and
/// any of those written as a string.
fn parse_coordinates(value: &Value) -> PilotResult<Coordinates> {
    let malformed = || PilotError::MalformedResponse(format!("unusable coordinates {value}"));

    if let Value::String(s) = value {
        let normalized = s.trim().replace('(', "[").replace(')', "]");
        let inner: Value = serde_json::from_str(&normalized).map_err(|_| malformed())?;
        if inner.is_string() {
            return Err(malformed());
        }
        return parse_coordinates(&inner);
    }

    let items = value.as_array().ok_or_else(malformed)?;
    match items.as_slice() {
        [a, b] if a.is_array() && b.is_array() => Ok(Coordinates::Pair(
            parse_point(a).ok_or_else(malformed)?,
            parse_point(b).ok_or_else(malformed)?,
        )),
        [x, y] => Ok(Coordinates::Point(point_from(x, y).ok_or_else(malformed)?)),
        [x1, y1, x2, y2] => Ok(Coordinates::Pair(
            point_from(x1, y1).ok_or_else(malformed)?,
            point_from(x2, y2).ok_or_else(malformed)?,
        )),
        _ => Err(malformed()),
    }
}

fn parse_point(value: &Value) -> Option<Point> {
    match value.as_array()?.as_slice() {
        [x, y] => point_from(x, y),
        _ => None,
    }
}

fn point_from(x: &Value, y: &Value) -> Option<Point> {
    Some(Point::new(number(x)?, number(y)?))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn validate_shape(action: ActionKind, coordinates: &Coordinates) -> PilotResult<()> {
    match (action, coordinates) {
        (ActionKind::Drag, Coordinates::Point(_)) => Err(PilotError::InvalidActionShape {
            action: action.to_string(),
            detail: "drag needs a start and an end point".into(),
        }),
        (ActionKind::Drag, Coordinates::Pair(..)) => Ok(()),
        (_, Coordinates::Pair(..)) => Err(PilotError::InvalidActionShape {
            action: action.to_string(),
            detail: "only drag takes a coordinate pair".into(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn full_reply_decodes() {
        let d = decode_descriptor(&object(json!({
            "current_status": "search box focused",
            "whether_completed": "False",
            "element_info": "search box",
            "coordinates": [120, 45.5],
            "action": "click",
            "type_information": "weather today"
        })))
        .unwrap();
        assert_eq!(d.action, ActionKind::Click);
        assert_eq!(d.completion, Completion::InProgress);
        assert_eq!(d.coordinates, Coordinates::Point(Point { x: 120.0, y: 45.5 }));
        assert_eq!(d.text, "weather today");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let d = decode_descriptor(&object(json!({ "whether_completed": "False" }))).unwrap();
        assert_eq!(d.status, "unknown");
        assert_eq!(d.target_description, "unknown");
        assert_eq!(d.action, ActionKind::Unknown);
        assert_eq!(d.coordinates, Coordinates::Point(Point { x: 0.0, y: 0.0 }));
        assert_eq!(d.text, "");

        let d = decode_descriptor(&object(json!({ "action": "click" }))).unwrap();
        assert_eq!(d.completion, Completion::Blocked);
    }

    #[test]
    fn drag_pairs_in_both_layouts() {
        for coords in [json!([[1, 2], [3, 4]]), json!([1, 2, 3, 4]), json!("[[1, 2], [3, 4]]")] {
            let d = decode_descriptor(&object(json!({
                "whether_completed": "False",
                "action": "drag",
                "coordinates": coords
            })))
            .unwrap();
            assert_eq!(
                d.coordinates,
                Coordinates::Pair(Point { x: 1.0, y: 2.0 }, Point { x: 3.0, y: 4.0 })
            );
        }
    }

    #[test]
    fn string_and_tuple_coordinates() {
        let d = decode_descriptor(&object(json!({
            "whether_completed": "False",
            "action": "click",
            "coordinates": "(300, 400)"
        })))
        .unwrap();
        assert_eq!(d.coordinates, Coordinates::Point(Point { x: 300.0, y: 400.0 }));

        let d = decode_descriptor(&object(json!({
            "whether_completed": "False",
            "action": "click",
            "coordinates": ["7", "8"]
        })))
        .unwrap();
        assert_eq!(d.coordinates, Coordinates::Point(Point { x: 7.0, y: 8.0 }));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = decode_descriptor(&object(json!({
            "action": "drag",
            "coordinates": [1, 2]
        })))
        .unwrap_err();
        assert!(matches!(err, PilotError::InvalidActionShape { .. }));

        let err = decode_descriptor(&object(json!({
            "action": "click",
            "coordinates": [[1, 2], [3, 4]]
        })))
        .unwrap_err();
        assert!(err.is_malformed_response());

        let err = decode_descriptor(&object(json!({
            "action": "click",
            "coordinates": [1, 2, 3]
        })))
        .unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[test]
    fn user_content_layout() {
        assert_eq!(build_user_content("", None, "open notepad"), "open notepad");
        let text = build_user_content("{\"action\":\"click\"}", Some("click at (1, 2)"), "task");
        assert_eq!(
            text,
            "Previous model outputs (most recent first):\n{\"action\":\"click\"}\n\
             Action executed last iteration: click at (1, 2)\n\ntask"
        );
    }

    struct Canned {
        reply: String,
        seen: Mutex<Vec<DecisionRequest>>,
    }

    #[async_trait]
    impl DecisionTransport for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, request: DecisionRequest) -> PilotResult<String> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn capture() -> CaptureResult {
        CaptureResult {
            path: "imgs/screen.png".into(),
            scale: 1.0,
            width: 10,
            height: 10,
            screen_width: 10,
            screen_height: 10,
            png_bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn decide_sends_image_and_parses_fenced_reply() {
        let transport = Arc::new(Canned {
            reply: "```json\n{\"whether_completed\":\"True\",\"current_status\":\"done\"}\n```".into(),
            seen: Mutex::new(Vec::new()),
        });
        let client = DecisionClient::new(transport.clone(), "sys".into(), true);

        let outcome = client.decide(&capture(), "task".into()).await.unwrap();
        match outcome {
            DecisionOutcome::Action(d) => {
                assert_eq!(d.completion, Completion::Completed);
                assert_eq!(d.status, "done");
            }
            other => panic!("unexpected {other:?}"),
        }
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].system_instruction, "sys");
        assert_eq!(seen[0].image_data_url, "data:image/png;base64,AQID");
    }

    #[tokio::test]
    async fn no_credential_skips_without_calling() {
        let transport = Arc::new(Canned {
            reply: "{}".into(),
            seen: Mutex::new(Vec::new()),
        });
        let client = DecisionClient::new(transport.clone(), "sys".into(), false);
        let outcome = client.decide(&capture(), "task".into()).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Skipped(_)));
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
