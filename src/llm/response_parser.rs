//! Tolerant extraction of the action object from raw model text.
//!
//! The model is asked for strict JSON but regularly wraps it in a code
//! fence, surrounds it with prose, or doubles the outer braces. Each stage
//! below is tried only when the previous one produced nothing decodable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::{PilotError, PilotResult};

type JsonObject = Map<String, Value>;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*[ \t]*\r?\n?(.*?)\s*```\s*$").expect("fence regex")
});
static LEADING_DOUBLE_BRACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\{\s*\{\s*").expect("leading brace regex"));
static TRAILING_DOUBLE_BRACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\}\s*\}\s*$").expect("trailing brace regex"));

/// Extract a JSON object from `raw`.
///
/// Never panics on malformed input; failure is
/// [`PilotError::MalformedResponse`].
pub fn parse_action_json(raw: &str) -> PilotResult<JsonObject> {
    let text = strip_fence(raw);

    if let Some(obj) = longest_balanced_object(text) {
        return Ok(obj);
    }

    if let Some(obj) = first_to_last_brace(text).and_then(decode_object) {
        tracing::debug!("response decoded from outer brace slice");
        return Ok(obj);
    }

    if let Some(obj) = repair_double_braces(text) {
        tracing::debug!("response decoded after brace repair");
        return Ok(obj);
    }

    Err(PilotError::MalformedResponse(preview(raw)))
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_fence(raw: &str) -> &str {
    if let Some(inner) = FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    // An unterminated fence still loses its opening marker.
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => rest
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim(),
        None => trimmed,
    }
}

/// Every brace-balanced `{...}` span, ignoring braces inside string literals.
///
/// One pass with a stack of open-brace offsets. Quotes only open a string
/// inside an object, so stray quotes in surrounding prose do not hide it.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

/// The longest balanced span that decodes to an object.
fn longest_balanced_object(text: &str) -> Option<JsonObject> {
    let mut spans = balanced_spans(text);
    spans.sort_by_key(|s| std::cmp::Reverse(s.len()));
    spans.into_iter().find_map(decode_object)
}

fn first_to_last_brace(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn repair_double_braces(text: &str) -> Option<JsonObject> {
    let candidate = first_to_last_brace(text).unwrap_or(text);
    let repaired = LEADING_DOUBLE_BRACE_RE.replace(candidate, "{");
    let repaired = TRAILING_DOUBLE_BRACE_RE.replace(&repaired, "}");
    if let Some(obj) = decode_object(&repaired) {
        return Some(obj);
    }
    let collapsed = candidate.replace("{{", "{").replace("}}", "}");
    decode_object(&collapsed)
}

fn decode_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn preview(raw: &str) -> String {
    const MAX: usize = 200;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    let mut out: String = trimmed.chars().take(MAX).collect();
    if trimmed.chars().count() > MAX {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const CANONICAL: &str = r#"{"current_status":"opening browser","whether_completed":"False","element_info":"Chrome icon","coordinates":[10,20],"action":"click","type_information":""}"#;

    fn canonical() -> JsonObject {
        match serde_json::from_str(CANONICAL).unwrap() {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn fenced_block_is_unwrapped() {
        let raw = format!("```json\n{CANONICAL}\n```");
        assert_eq!(parse_action_json(&raw).unwrap(), canonical());

        let bare_fence = format!("```\n{CANONICAL}\n```");
        assert_eq!(parse_action_json(&bare_fence).unwrap(), canonical());
    }

    #[test]
    fn valid_json_is_returned_unchanged() {
        let once = parse_action_json(CANONICAL).unwrap();
        assert_eq!(once, canonical());
        let again = parse_action_json(&Value::Object(once.clone()).to_string()).unwrap();
        assert_eq!(again, once);
    }

    #[test]
    fn prose_around_object() {
        let raw = format!("Sure! Here is the next step:\n{CANONICAL}\nLet me know.");
        assert_eq!(parse_action_json(&raw).unwrap(), canonical());
    }

    #[test]
    fn longest_object_wins() {
        let raw = r#"{"a":1} and then {"action":"drag","coordinates":[[1,2],[3,4]]}"#;
        let obj = parse_action_json(raw).unwrap();
        assert_eq!(obj["action"], json!("drag"));
        assert_eq!(obj["coordinates"], json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let raw = r#"note {"element_info":"button labelled }{","action":"click"}"#;
        let obj = parse_action_json(raw).unwrap();
        assert_eq!(obj["element_info"], json!("button labelled }{"));
    }

    #[test]
    fn quotes_in_prose_before_the_object() {
        let raw = format!("The \"Search\" box is at the top, so: {CANONICAL}");
        assert_eq!(parse_action_json(&raw).unwrap(), canonical());
    }

    #[test]
    fn large_unbalanced_input_fails_quickly() {
        let started = std::time::Instant::now();
        let raw = "{".repeat(40_000);
        assert!(parse_action_json(&raw).is_err());

        let nested = format!("{}{}", "{\"a\":".repeat(20_000), "}".repeat(20_000));
        assert!(parse_action_json(&nested).is_err());
        assert!(
            started.elapsed() < std::time::Duration::from_secs(2),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn doubled_braces_are_repaired() {
        let raw = r#"{{"action": "click", "coordinates": [1, 2]}}"#;
        let obj = parse_action_json(raw).unwrap();
        assert_eq!(obj["action"], json!("click"));

        let unbalanced = r#"{{"action": "scroll_up", "coordinates": [5, 6]}"#;
        let obj = parse_action_json(unbalanced).unwrap();
        assert_eq!(obj["action"], json!("scroll_up"));
    }

    #[test]
    fn unterminated_fence() {
        let raw = format!("```json\n{CANONICAL}");
        assert_eq!(parse_action_json(&raw).unwrap(), canonical());
    }

    #[test]
    fn garbage_is_an_explicit_failure() {
        for raw in ["", "no json here", "{not: valid", "[1, 2, 3]", "}{"] {
            let err = parse_action_json(raw).unwrap_err();
            assert!(err.is_malformed_response(), "{raw:?} gave {err:?}");
        }
    }
}
