// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire-level vocabulary for talking to a chat-completion model: messages,
//! roles, tool schemas, and the streamed response events a provider emits.

use serde::{Deserialize, Serialize};

/// A single part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image_url: String, #[serde(default)] detail: Option<String> },
}

impl ContentPart {
    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::Image { image_url: url.into(), detail: None }
    }
}

/// A single part of a tool's result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContentPart {
    Text { text: String },
    Image { image_url: String },
}

/// The content carried by a `tool`-role message: either plain text or a
/// multimodal sequence (used when a tool returns an image).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Parts(Vec<ToolContentPart>),
}

impl ToolResultContent {
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            ToolResultContent::Text(_) => Vec::new(),
            ToolResultContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ToolContentPart::Image { image_url } => Some(image_url.as_str()),
                    ToolContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A function/tool call requested by the assistant, as carried inside a
/// message (name + raw JSON argument string, matching the wire format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Body of a single message. Untagged so plain-text messages serialize as a
/// bare string on the wire, matching the shape most chat APIs expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ContentParts(Vec<ContentPart>),
    ToolCall { tool_call_id: String, function: FunctionCall },
    ToolResult { tool_call_id: String, content: ToolResultContent },
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::User, content: MessageContent::ContentParts(parts) }
    }

    pub fn tool_call(tool_call_id: impl Into<String>, function: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall { tool_call_id: tool_call_id.into(), function },
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: ToolResultContent::Text(text.into()),
            },
        }
    }

    pub fn tool_result_with_parts(tool_call_id: impl Into<String>, parts: Vec<ToolContentPart>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: ToolResultContent::Parts(parts),
            },
        }
    }

    /// Flatten to plain text, if this message is text-shaped.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::ContentParts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            }),
            _ => None,
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::ContentParts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image { image_url, .. } => Some(image_url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
            MessageContent::ToolResult { content, .. } => content.image_urls(),
            _ => Vec::new(),
        }
    }

    /// Rough token estimate (chars / 4), used for context-budget accounting.
    /// Not a tokenizer — a cheap, provider-agnostic heuristic.
    pub fn approx_tokens(&self) -> usize {
        let char_count = match &self.content {
            MessageContent::Text(t) => t.chars().count(),
            MessageContent::ContentParts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.chars().count(),
                    ContentPart::Image { .. } => 400, // flat estimate for an inline image
                })
                .sum(),
            MessageContent::ToolCall { function, .. } => function.name.len() + function.arguments.len(),
            MessageContent::ToolResult { content, .. } => match content {
                ToolResultContent::Text(t) => t.chars().count(),
                ToolResultContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ToolContentPart::Text { text } => text.chars().count(),
                        ToolContentPart::Image { .. } => 400,
                    })
                    .sum(),
            },
        };
        (char_count / 4).max(1)
    }
}

/// Static description of a tool, as passed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A request to complete a conversation.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub stream: bool,
}

/// One event in the streamed response to a [`CompletionRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    TextDelta(String),
    ToolCall { index: u32, id: String, name: String, arguments: String },
    Usage { input_tokens: u32, output_tokens: u32 },
    Error(String),
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
