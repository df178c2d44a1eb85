// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Prompt-based tool calling, used when a model rejects native tool-calling.
//!
//! When native tool-calling fails, the client falls back to asking the model
//! to emit `<tool_call>{"name":…,"arguments":{…}}</tool_call>` tags in its
//! plain-text reply. [`NativeToolSupport`] remembers which models have
//! already been observed to need this so later calls skip straight to the
//! fallback rather than re-probing every turn.

use std::collections::HashSet;
use std::sync::RwLock;

use regex::Regex;
use serde_json::Value;

use crate::ToolSchema;

/// Process-wide record of model names that have refused native tool-calling.
/// Explicit shared state behind a write-lock rather than a bare mutable
/// global, so the "remembered" set has a clear owner and can be constructed
/// fresh per test.
#[derive(Default)]
pub struct NativeToolSupport {
    unsupported: RwLock<HashSet<String>>,
}

impl NativeToolSupport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once `model` has been observed to reject native tool-calling.
    pub fn needs_fallback(&self, model: &str) -> bool {
        self.unsupported.read().unwrap().contains(model)
    }

    /// Record that `model` does not support native tool-calling.
    pub fn mark_unsupported(&self, model: &str) {
        self.unsupported.write().unwrap().insert(model.to_string());
    }
}

/// Build the system-prompt suffix instructing the model to emit tool calls
/// as tagged JSON blocks instead of using native tool-calling.
pub fn build_fallback_instructions(tools: &[ToolSchema]) -> String {
    let mut lines = vec![
        "You have access to the following tools. To call one, respond with a block of the exact form:".to_string(),
        r#"<tool_call>{"name": "<tool name>", "arguments": {<json arguments>}}</tool_call>"#.to_string(),
        "You may emit more than one such block. Do not call a tool that is not listed below.".to_string(),
        String::new(),
        "## Available tools".to_string(),
    ];
    for t in tools {
        lines.push(format!("- **{}**: {}", t.name, t.description));
        lines.push(format!("  parameters: {}", t.parameters));
    }
    lines.join("\n")
}

fn tool_call_regex() -> Regex {
    Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").expect("static regex is valid")
}

/// A tool call parsed out of free-form assistant text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Extract every `<tool_call>{...}</tool_call>` block from `text`.
///
/// Malformed blocks (invalid JSON, missing `name`) are silently skipped so
/// the model can still deliver its surrounding prose; the parser never
/// raises. Returns the cleaned text (tags removed) and the parsed calls, in
/// the order they appeared.
pub fn parse_tool_calls(text: &str) -> (String, Vec<ParsedToolCall>) {
    let re = tool_call_regex();
    let mut calls = Vec::new();
    for cap in re.captures_iter(text) {
        let Ok(v) = serde_json::from_str::<Value>(&cap[1]) else { continue };
        let Some(name) = v.get("name").and_then(|n| n.as_str()) else { continue };
        let arguments = v.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        calls.push(ParsedToolCall { name: name.to_string(), arguments });
    }
    let cleaned = re.replace_all(text, "").trim().to_string();
    (cleaned, calls)
}

/// Heuristic check used by the agent loop to catch a model that emitted
/// tool-call-shaped text without going through the tagged protocol (e.g. bare
/// XML/function-call syntax). Used to nudge the model to retry in the
/// correct format.
pub fn text_contains_malformed_tool_call(text: &str) -> bool {
    text.contains("<tool_call>") || text.contains("</tool_call>")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
