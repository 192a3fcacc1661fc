//! Downstream wire model: the Ollama/OpenAI-compatible chat request and the
//! response shapes this proxy emits, including the NDJSON stream chunks.

use crate::error::{AppError, AppResult};
use crate::gemini::TokenUsage;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

fn default_temperature() -> f64 {
    0.5
}

fn default_top_p() -> f64 {
    1.0
}

/// Decodes an inbound chat completion body, repairing known client quirks
/// before strict validation.
///
/// Some clients omit the `content` field entirely on empty turns; those
/// elements get `content: ""` injected so validation accepts them. Anything
/// still invalid afterwards is a malformed request.
pub fn decode_chat_request(mut body: Value) -> AppResult<ChatCompletionRequest> {
    if let Some(messages) = body.get_mut("messages").and_then(|v| v.as_array_mut()) {
        for message in messages {
            let Some(obj) = message.as_object_mut() else {
                continue;
            };
            if obj.contains_key("role") && !obj.contains_key("content") {
                obj.insert("content".to_string(), Value::String(String::new()));
            }
        }
    }
    serde_json::from_value(body).map_err(|err| AppError::malformed_request(err.to_string()))
}

/// Builds the single non-streaming completion object.
pub fn completion_response(model: &str, text: &str, usage: &TokenUsage) -> Value {
    json!({
        "choices": [{
            "finish_reason": "stop",
            "index": 0,
            "message": {
                "content": text,
                "role": "assistant",
            },
        }],
        "created": chrono::Utc::now().timestamp(),
        "id": "chatcmpl-default",
        "model": model,
        "object": "chat.completion",
        "usage": {
            "completion_tokens": usage.completion_tokens,
            "prompt_tokens": usage.prompt_tokens,
            "total_tokens": usage.total_tokens,
        },
    })
}

/// One NDJSON chunk carrying a single fragment of generated text.
pub fn stream_chunk(model: &str, fragment: &str) -> Value {
    json!({
        "created_at": chrono::Utc::now().to_rfc3339(),
        "done": false,
        "message": {
            "role": "assistant",
            "content": fragment,
        },
        "model": model,
    })
}

/// The terminal chunk closing a clean stream. Token and duration counters
/// are sentinels; the streaming endpoint does not report real usage.
pub fn terminal_chunk(model: &str) -> Value {
    json!({
        "created_at": chrono::Utc::now().to_rfc3339(),
        "done": true,
        "eval_count": 0,
        "eval_duration": 1,
        "load_duration": 1,
        "message": {
            "content": "",
            "role": "assistant",
        },
        "model": model,
        "prompt_eval_count": 0,
        "total_duration": 1,
    })
}
