use crate::errors::{PilotError, PilotResult};

/// A meaningful line of an OpenAI-compatible SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A fragment of the assistant's reply.
    Content(String),
    /// Reasoning text some models stream alongside the reply.
    Reasoning(String),
    Done,
}

/// Parses a raw SSE line into an event.
/// Returns None for keep-alives, comments and deltas with nothing in them.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<SseEvent>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| PilotError::Transport(format!("SSE chunk: {e}")))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            return Ok(Some(SseEvent::Reasoning(reasoning.to_string())));
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(SseEvent::Content(content.to_string())));
        }
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(SseEvent::Done));
    }

    Ok(None)
}
