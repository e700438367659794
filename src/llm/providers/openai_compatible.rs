use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::{AiConfig, ApiConfig};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::DecisionTransport;
use crate::llm::sse_parser::{self, SseEvent};
use crate::llm::types::DecisionRequest;

/// Chat-completions transport for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    stream: bool,
    thinking_type: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn from_config(api: &ApiConfig, ai: &AiConfig) -> PilotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            id: "openai_compatible".to_string(),
            api_base: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.api_key.clone(),
            model: api.model_name.clone(),
            stream: api.stream,
            thinking_type: ai.thinking_type.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        if self.api_base.ends_with("/chat/completions") {
            self.api_base.clone()
        } else {
            format!("{}/chat/completions", self.api_base)
        }
    }

    fn build_body(&self, request: &DecisionRequest) -> PilotResult<serde_json::Value> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": serde_json::to_value(request.to_messages())?,
            "stream": self.stream,
            "response_format": action_response_format(),
        });
        if !self.thinking_type.is_empty() {
            body["thinking"] = serde_json::json!({ "type": self.thinking_type });
        }
        Ok(body)
    }
}

#[async_trait]
impl DecisionTransport for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: DecisionRequest) -> PilotResult<String> {
        let body = self.build_body(&request)?;

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            stream = self.stream,
            thinking = %self.thinking_type,
            "sending decision request"
        );
        tracing::debug!(
            body = %sanitized_for_log(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Transport(format!("{status}: {err_body}")));
        }

        if self.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate content deltas from an SSE response.
    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut content = String::new();
        let mut reasoning_len = 0usize;

        'stream: while let Some(result) = byte_stream.next().await {
            pending.extend_from_slice(&result?);

            // Only split on complete lines so multi-byte characters survive
            // chunk boundaries.
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match sse_parser::parse_sse_line(line) {
                    Ok(Some(SseEvent::Content(delta))) => content.push_str(&delta),
                    Ok(Some(SseEvent::Reasoning(delta))) => reasoning_len += delta.len(),
                    Ok(Some(SseEvent::Done)) => break 'stream,
                    Ok(None) => {}
                    Err(e) => tracing::debug!("SSE parse skipped: {e}"),
                }
            }
        }

        tracing::info!(
            content_len = content.len(),
            reasoning_len,
            "decision stream complete"
        );
        Ok(content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> PilotResult<String> {
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| PilotError::Transport("response has no message content".into()))?
            .to_string();

        tracing::info!(content_len = content.len(), "decision response received");
        tracing::debug!(content = %content, "raw decision");
        Ok(content)
    }
}

/// JSON schema of the action reply, requested as structured output.
fn action_response_format() -> serde_json::Value {
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "next_action",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "current_status": { "type": "string" },
                    "whether_completed": { "type": "string" },
                    "element_info": { "type": "string" },
                    "coordinates": { "type": "array", "items": {} },
                    "action": { "type": "string" },
                    "type_information": { "type": "string" }
                },
                "required": [
                    "current_status",
                    "whether_completed",
                    "element_info",
                    "coordinates",
                    "action",
                    "type_information"
                ],
                "additionalProperties": false
            }
        }
    })
}

/// Copy of the body with image payloads replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.pointer_mut("/image_url/url") {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
