//! Gemini wire codec: maps the normalized chat request into the provider's
//! `generateContent` body and decodes replies, stream fragments, and the
//! model list.

use crate::chat::{ChatCompletionRequest, ChatMessage};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone)]
pub struct MappedPrompt {
    pub contents: Vec<Value>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GenerateReply {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    pub display_name: String,
    pub supports_generation: bool,
}

/// Converts role-tagged chat messages into Gemini contents plus an optional
/// system instruction.
///
/// The first message is promoted to the system instruction when its role is
/// `system`, or when its role is `user` and the content contains "you must"
/// (case-insensitive). The substring match is a compatibility shim for
/// clients that embed system prompts as the first user turn; it is kept
/// verbatim, not tightened. `assistant` maps to `model`; every other role
/// passes through unchanged.
pub fn map_messages(messages: &[ChatMessage]) -> MappedPrompt {
    let mut system_instruction = None;
    let mut remaining = messages;

    if let Some(first) = messages.first() {
        let promote = first.role == "system"
            || (first.role == "user" && first.content.to_lowercase().contains("you must"));
        if promote {
            system_instruction = Some(first.content.clone());
            remaining = &messages[1..];
        }
    }

    let contents = remaining
        .iter()
        .map(|msg| {
            let role = if msg.role == "assistant" {
                "model"
            } else {
                msg.role.as_str()
            };
            json!({ "role": role, "parts": [{ "text": msg.content }] })
        })
        .collect();

    MappedPrompt {
        contents,
        system_instruction,
    }
}

/// Builds the `generateContent` request body from the normalized request and
/// the mapped prompt. The model name itself travels in the URL, not here.
pub fn encode_generate_request(req: &ChatCompletionRequest, prompt: &MappedPrompt) -> Value {
    let mut body = json!({ "contents": prompt.contents });
    let obj = body.as_object_mut().expect("generate request object");

    if let Some(system) = &prompt.system_instruction {
        obj.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": system }] }),
        );
    }

    let mut generation_config = Map::new();
    generation_config.insert("temperature".to_string(), Value::from(req.temperature));
    generation_config.insert("topP".to_string(), Value::from(req.top_p));
    if let Some(seed) = req.seed {
        generation_config.insert("seed".to_string(), Value::from(seed));
    }
    if let Some(stop) = &req.stop {
        generation_config.insert("stopSequences".to_string(), json!(stop));
    }
    obj.insert(
        "generationConfig".to_string(),
        Value::Object(generation_config),
    );

    body
}

/// Decodes a non-streaming `generateContent` reply into the generated text
/// and the provider's token counters.
pub fn decode_generate_reply(value: &Value) -> Result<GenerateReply, String> {
    let text = candidate_text(value)
        .ok_or_else(|| "upstream reply carried no candidate text".to_string())?;
    let usage = value
        .get("usageMetadata")
        .map(|meta| TokenUsage {
            prompt_tokens: count(meta, "promptTokenCount"),
            completion_tokens: count(meta, "candidatesTokenCount"),
            total_tokens: count(meta, "totalTokenCount"),
        })
        .unwrap_or(TokenUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });
    Ok(GenerateReply { text, usage })
}

/// Extracts the text of one streamed chunk, or `None` for chunks with no
/// candidate content (safety metadata, usage-only frames).
pub fn fragment_text(chunk: &Value) -> Option<String> {
    candidate_text(chunk)
}

fn candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|v| v.as_array())?;
    let mut text = String::new();
    let mut saw_text = false;
    for part in parts {
        if let Some(piece) = part.get("text").and_then(|v| v.as_str()) {
            text.push_str(piece);
            saw_text = true;
        }
    }
    // Parts without a single text key (inline data, function calls) count
    // as contentless, same as a missing candidate.
    saw_text.then_some(text)
}

fn count(meta: &Value, key: &str) -> u64 {
    meta.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Decodes the provider's model list into catalog entries.
pub fn decode_model_entries(value: &Value) -> Vec<ModelEntry> {
    let Some(models) = value.get("models").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    models
        .iter()
        .filter_map(|model| {
            let name = model.get("name").and_then(|v| v.as_str())?.to_string();
            let display_name = model
                .get("displayName")
                .and_then(|v| v.as_str())
                .unwrap_or(&name)
                .to_string();
            let supports_generation = model
                .get("supportedGenerationMethods")
                .and_then(|v| v.as_array())
                .map(|methods| {
                    methods
                        .iter()
                        .any(|m| m.as_str() == Some("generateContent"))
                })
                .unwrap_or(false);
            Some(ModelEntry {
                name,
                display_name,
                supports_generation,
            })
        })
        .collect()
}
