// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The model client: adapts a raw [`ModelProvider`] stream into a single
//! [`AssistantTurn`], handling the native-tool-calling-with-fallback dance
//! described by the orchestrator's contract.

use futures::StreamExt;
use serde_json::Value;
use tracing::info;

use crate::fallback::{self, NativeToolSupport};
use crate::{CompletionRequest, Message, ModelProvider, ResponseEvent, Role, ToolSchema};

/// A single tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The assistant's full reply to one completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Adapts a [`ModelProvider`] into the `chat` / `chat_stream` contract,
/// transparently falling back to prompt-based tool calling when the
/// provider cannot do native tool-calling for the current model.
pub struct ModelClient {
    provider: Box<dyn ModelProvider>,
    native_tools: NativeToolSupport,
}

impl ModelClient {
    pub fn new(provider: Box<dyn ModelProvider>) -> Self {
        Self { provider, native_tools: NativeToolSupport::new() }
    }

    pub fn provider(&self) -> &dyn ModelProvider {
        self.provider.as_ref()
    }

    /// Complete a conversation without streaming.
    pub async fn chat(&self, messages: Vec<Message>, tools: &[ToolSchema]) -> anyhow::Result<AssistantTurn> {
        self.run(messages, tools, false, |_| {}).await
    }

    /// Complete a conversation, invoking `on_chunk` with each text delta as
    /// it arrives. `on_chunk` only ever receives prose — never raw tool-call
    /// tags, even in fallback mode (those are stripped before being handed
    /// to the caller as part of the final turn, and are not streamed).
    pub async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        on_chunk: impl FnMut(&str),
    ) -> anyhow::Result<AssistantTurn> {
        self.run(messages, tools, true, on_chunk).await
    }

    async fn run(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        stream: bool,
        mut on_chunk: impl FnMut(&str),
    ) -> anyhow::Result<AssistantTurn> {
        let model = self.provider.model_name().to_string();

        if self.native_tools.needs_fallback(&model) {
            return self.run_fallback(messages, tools, stream, &mut on_chunk).await;
        }

        match self.run_native(messages.clone(), tools, stream, &mut on_chunk).await {
            Ok(turn) => Ok(turn),
            Err(e) if looks_like_tool_calling_unsupported(&e) => {
                info!(model = %model, error = %e, "model rejected native tool-calling; falling back to prompt-based tool calls");
                self.native_tools.mark_unsupported(&model);
                self.run_fallback(messages, tools, stream, &mut on_chunk).await
            }
            Err(e) => Err(e),
        }
    }

    async fn run_native(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        stream: bool,
        on_chunk: &mut impl FnMut(&str),
    ) -> anyhow::Result<AssistantTurn> {
        let req = CompletionRequest { messages, tools: tools.to_vec(), stream };
        let mut events = self.provider.complete(req).await?;

        let mut text = String::new();
        let mut pending: Vec<(String, String, String)> = Vec::new(); // (id, name, arguments buffer) by index order
        let mut usage = (0u32, 0u32);

        while let Some(event) = events.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => {
                    if !delta.is_empty() {
                        if stream {
                            on_chunk(&delta);
                        }
                        text.push_str(&delta);
                    }
                }
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let idx = index as usize;
                    while pending.len() <= idx {
                        pending.push((String::new(), String::new(), String::new()));
                    }
                    if !id.is_empty() {
                        pending[idx].0 = id;
                    }
                    if !name.is_empty() {
                        pending[idx].1 = name;
                    }
                    pending[idx].2.push_str(&arguments);
                }
                ResponseEvent::Usage { input_tokens, output_tokens } => {
                    usage = (input_tokens, output_tokens);
                }
                ResponseEvent::Error(msg) => anyhow::bail!("model provider error: {msg}"),
                ResponseEvent::Done => break,
            }
        }

        let tool_calls = pending
            .into_iter()
            .filter(|(_, name, _)| !name.is_empty())
            .map(|(id, name, args)| {
                let arguments = serde_json::from_str(&args).unwrap_or_else(|_| Value::Object(Default::default()));
                ToolCallRequest { id, name, arguments }
            })
            .collect();

        Ok(AssistantTurn { text, tool_calls, input_tokens: usage.0, output_tokens: usage.1 })
    }

    async fn run_fallback(
        &self,
        mut messages: Vec<Message>,
        tools: &[ToolSchema],
        stream: bool,
        on_chunk: &mut impl FnMut(&str),
    ) -> anyhow::Result<AssistantTurn> {
        if !tools.is_empty() {
            let suffix = fallback::build_fallback_instructions(tools);
            if let Some(first) = messages.first_mut() {
                if first.role == Role::System {
                    if let crate::MessageContent::Text(t) = &first.content {
                        first.content = crate::MessageContent::Text(format!("{t}\n\n{suffix}"));
                    }
                } else {
                    messages.insert(0, Message::system(suffix));
                }
            } else {
                messages.push(Message::system(suffix));
            }
        }

        // Fallback mode never advertises native tool schemas: the model has
        // already shown it cannot consume them.
        let req = CompletionRequest { messages, tools: Vec::new(), stream };
        let mut events = self.provider.complete(req).await?;

        let mut raw_text = String::new();
        let mut usage = (0u32, 0u32);
        while let Some(event) = events.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => raw_text.push_str(&delta),
                ResponseEvent::Usage { input_tokens, output_tokens } => usage = (input_tokens, output_tokens),
                ResponseEvent::Error(msg) => anyhow::bail!("model provider error: {msg}"),
                ResponseEvent::Done => break,
                ResponseEvent::ToolCall { .. } => {}
            }
        }

        let (cleaned, parsed) = fallback::parse_tool_calls(&raw_text);
        if stream && !cleaned.is_empty() {
            on_chunk(&cleaned);
        }

        let tool_calls = parsed
            .into_iter()
            .enumerate()
            .map(|(i, c)| ToolCallRequest { id: format!("fallback-{i}"), name: c.name, arguments: c.arguments })
            .collect();

        Ok(AssistantTurn { text: cleaned, tool_calls, input_tokens: usage.0, output_tokens: usage.1 })
    }
}

/// Heuristic: does this error look like the provider rejecting native
/// tool-calling for the current model (as opposed to a network/auth fault)?
fn looks_like_tool_calling_unsupported(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("tool") && (msg.contains("not support") || msg.contains("unsupported") || msg.contains("does not support"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
