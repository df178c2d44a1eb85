// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The tool contract every built-in and pluggable tool implements.
//!
//! A tool declares its own name, description and JSON-Schema parameter
//! shape, and decides for itself — per call, from the arguments — whether
//! the call needs human approval before it runs. `execute` returns `Err`
//! only for a genuine tool fault; the agent logs those to the failure log
//! and renders them to the model as an error string so the loop continues.

use async_trait::async_trait;
use serde_json::Value;

pub use pigeon_model::ToolSchema;

/// Trait every built-in and pluggable tool implements. Name uniqueness is
/// enforced by [`crate::registry::ToolRegistry`] at registration time, not
/// here.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-Schema-shaped object describing `properties` and `required`.
    fn parameters_schema(&self) -> Value;

    /// Whether this particular call needs a human's yes/no before it runs.
    /// Most tools answer a fixed value; a tool with a monetary or
    /// irreversible side effect (e.g. a payment tool) may inspect `args`
    /// and answer `true` only above a threshold.
    fn requires_approval(&self, args: &Value) -> bool {
        let _ = args;
        false
    }

    /// When `requires_approval` is true for a monetary action, the amount
    /// to surface to the approval handler. `None` when not applicable.
    fn approval_amount(&self, args: &Value) -> Option<f64> {
        let _ = args;
        None
    }

    /// Execute the tool for `user_id` with the model-supplied `args`,
    /// returning free-form text. Validate `args` against the declared
    /// schema inside the implementation — the registry does not do this.
    async fn execute(&self, user_id: &str, args: &Value) -> anyhow::Result<String>;
}

pub fn schema_of(tool: &dyn Tool) -> ToolSchema {
    ToolSchema {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}
