// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A single generic provider speaking the OpenAI-compatible
//! `/chat/completions` SSE wire format. Most self-hosted and gateway model
//! servers (llama.cpp, vLLM, Ollama, OpenRouter, ...) speak this format, so
//! one implementation covers all of them; only the base URL, auth header and
//! model id change between deployments.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{provider::ResponseStream, CompletionRequest, ResponseEvent, Role};

/// How to send the API key in HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// No authentication header — local servers (Ollama, llama.cpp, vLLM).
    None,
}

pub struct OpenAiCompatProvider {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    auth_style: AuthStyle,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: u32,
        temperature: f32,
        auth_style: AuthStyle,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
            auth_style,
        }
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let messages = build_openai_messages(&req.messages);
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| json!({"type": "function", "function": {"name": t.name, "description": t.description, "parameters": t.parameters}}))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": req.stream,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(model = %self.model, tool_count = tools.len(), message_count = messages.len(), "sending completion request");

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        http_req = match self.auth_style {
            AuthStyle::Bearer => {
                let key = self
                    .api_key
                    .as_deref()
                    .context("API key not set; provide api_key or api_key_env in config")?;
                http_req.bearer_auth(key)
            }
            AuthStyle::None => http_req,
        };

        let resp = http_req.send().await.context("model request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("model provider error {status}: {text}");
        }

        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let events: Vec<anyhow::Result<ResponseEvent>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single complete SSE `data:` line into a [`ResponseEvent`].
fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_sse_chunk(&v))
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing partial line for the next chunk (a single event may span TCP
/// packets).
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<ResponseEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn parse_sse_chunk(v: &Value) -> anyhow::Result<ResponseEvent> {
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return Ok(ResponseEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });
    }

    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    if let Some(tool_calls) = delta.get("tool_calls") {
        if let Some(tc) = tool_calls.get(0) {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let id = tc["id"].as_str().unwrap_or("").to_string();
            let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
            let args = tc["function"]["arguments"].as_str().unwrap_or("").to_string();
            return Ok(ResponseEvent::ToolCall { index, id, name, arguments: args });
        }
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        return Ok(ResponseEvent::TextDelta(text.to_string()));
    }

    Ok(ResponseEvent::TextDelta(String::new()))
}

/// Convert messages into the OpenAI wire-format JSON array.
///
/// **Parallel tool call coalescing**: the API requires all tool calls from
/// one assistant turn to appear inside a single assistant message as a
/// `tool_calls` array. We store each call as a separate `ToolCall` message
/// internally, so consecutive `ToolCall` entries are merged back into one
/// JSON object here.
pub(crate) fn build_openai_messages(messages: &[crate::Message]) -> Vec<Value> {
    use crate::{ContentPart, MessageContent, ToolContentPart, ToolResultContent};

    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({"id": tool_call_id, "type": "function", "function": {"name": function.name, "arguments": function.arguments}})
    }

    fn tool_result_to_json(tool_call_id: &str, content: &ToolResultContent) -> Value {
        let wire_content: Value = match content {
            ToolResultContent::Text(t) => json!(t),
            ToolResultContent::Parts(parts) if !parts.is_empty() => {
                let arr: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        ToolContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ToolContentPart::Image { image_url } => json!({"type": "image_url", "image_url": {"url": image_url}}),
                    })
                    .collect();
                json!(arr)
            }
            ToolResultContent::Parts(_) => json!(""),
        };
        json!({"role": "tool", "tool_call_id": tool_call_id, "content": wire_content})
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];

        if let MessageContent::ToolCall { tool_call_id, function } = &m.content {
            let mut calls = vec![tool_call_to_json(tool_call_id, function)];
            i += 1;
            while i < messages.len() {
                if let MessageContent::ToolCall { tool_call_id, function } = &messages[i].content {
                    calls.push(tool_call_to_json(tool_call_id, function));
                    i += 1;
                } else {
                    break;
                }
            }
            result.push(json!({"role": "assistant", "tool_calls": calls}));
            continue;
        }

        let v = match &m.content {
            MessageContent::Text(t) => json!({"role": role_str(&m.role), "content": t}),
            MessageContent::ContentParts(parts) if !parts.is_empty() => {
                let content: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ContentPart::Image { image_url, .. } => {
                            json!({"type": "image_url", "image_url": {"url": image_url}})
                        }
                    })
                    .collect();
                json!({"role": role_str(&m.role), "content": content})
            }
            MessageContent::ContentParts(_) => json!({"role": role_str(&m.role), "content": ""}),
            MessageContent::ToolResult { tool_call_id, content } => tool_result_to_json(tool_call_id, content),
            MessageContent::ToolCall { .. } => unreachable!("handled above"),
        };
        result.push(v);
        i += 1;
    }

    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionCall, Message};

    #[test]
    fn plain_text_message_becomes_role_content_object() {
        let msgs = vec![Message::user("hi")];
        let wire = build_openai_messages(&msgs);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["content"], "hi");
    }

    #[test]
    fn consecutive_tool_calls_merge_into_one_assistant_message() {
        let msgs = vec![
            Message::tool_call("c1", FunctionCall { name: "a".into(), arguments: "{}".into() }),
            Message::tool_call("c2", FunctionCall { name: "b".into(), arguments: "{}".into() }),
        ];
        let wire = build_openai_messages(&msgs);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["tool_calls"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msgs = vec![Message::tool_result("c1", "42")];
        let wire = build_openai_messages(&msgs);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "c1");
        assert_eq!(wire[0]["content"], "42");
    }

    #[test]
    fn drain_leaves_partial_line_buffered() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\nda");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(buf, "da");
    }

    #[test]
    fn done_sentinel_parses_to_done_event() {
        let mut buf = String::from("data: [DONE]\n");
        let events = drain_complete_sse_lines(&mut buf);
        assert!(matches!(events[0].as_ref().unwrap(), ResponseEvent::Done));
    }

    #[test]
    fn text_delta_chunk_parses() {
        let v: Value = serde_json::from_str(r#"{"choices":[{"delta":{"content":"hello"}}]}"#).unwrap();
        let ev = parse_sse_chunk(&v).unwrap();
        assert!(matches!(ev, ResponseEvent::TextDelta(t) if t == "hello"));
    }

    #[test]
    fn tool_call_chunk_parses() {
        let v: Value = serde_json::from_str(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"echo","arguments":"{}"}}]}}]}"#,
        )
        .unwrap();
        let ev = parse_sse_chunk(&v).unwrap();
        assert!(matches!(ev, ResponseEvent::ToolCall { name, .. } if name == "echo"));
    }
}
