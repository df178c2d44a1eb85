// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools that let the model inspect and close out its own failure log —
//! the other half of the self-healing loop alongside the skills tools in
//! [`crate::builtin::skills`]. A tool failure is recorded automatically by
//! the agent loop when execution returns `Err`; these tools only read that
//! log back and mark entries resolved once a fix has been learned.

use async_trait::async_trait;
use serde_json::{json, Value};

use pigeon_store::Store;

use crate::tool::Tool;

pub struct ViewFailureLogTool {
    store: Store,
}

impl ViewFailureLogTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ViewFailureLogTool {
    fn name(&self) -> &str {
        "view_failure_log"
    }
    fn description(&self) -> &str {
        "View recent tool failures, most recent first. Use this to understand what's been \
         going wrong before writing a skill to fix it."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "default": 10},
                "unresolved_only": {"type": "boolean", "default": true},
            },
            "required": [],
        })
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as u32;
        let unresolved_only = args.get("unresolved_only").and_then(Value::as_bool).unwrap_or(true);
        let failures = self.store.recent_failures(limit, unresolved_only).await?;
        if failures.is_empty() {
            return Ok("No failures logged.".to_string());
        }
        let mut out = String::new();
        for f in failures {
            out.push_str(&format!(
                "[{}] {} / {} (x{}): {}\n",
                f.id, f.tool_name, f.error_kind, f.occurrence_count, f.error_text
            ));
        }
        Ok(out)
    }
}

pub struct MarkFailureResolvedTool {
    store: Store,
}

impl MarkFailureResolvedTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MarkFailureResolvedTool {
    fn name(&self) -> &str {
        "mark_failure_resolved"
    }
    fn description(&self) -> &str {
        "Mark a logged failure as resolved, recording what fixed it. Do this after learning \
         a skill that addresses the failure."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "failure_id": {"type": "string"},
                "resolution_notes": {"type": "string"},
            },
            "required": ["failure_id", "resolution_notes"],
        })
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let failure_id = args
            .get("failure_id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing 'failure_id'"))?;
        let notes = args
            .get("resolution_notes")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing 'resolution_notes'"))?;
        self.store.mark_resolved(failure_id, notes).await?;
        Ok(format!("Marked failure {failure_id} resolved."))
    }
}

pub struct AnalyzeFailurePatternsTool {
    store: Store,
}

impl AnalyzeFailurePatternsTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AnalyzeFailurePatternsTool {
    fn name(&self) -> &str {
        "analyze_failure_patterns"
    }
    fn description(&self) -> &str {
        "Summarize the failure log: which tools and error kinds are failing most. Use this to \
         decide where to focus learning effort."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"tool_name": {"type": "string"}}, "required": []})
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        if let Some(tool_name) = args.get("tool_name").and_then(Value::as_str) {
            let failures = self.store.failures_by_tool(tool_name).await?;
            if failures.is_empty() {
                return Ok(format!("No failures logged for '{tool_name}'."));
            }
            let mut out = format!("Failures for '{tool_name}':\n");
            for f in failures {
                out.push_str(&format!(
                    "- {} (x{}, resolved={}): {}\n",
                    f.error_kind, f.occurrence_count, f.resolved, f.error_text
                ));
            }
            return Ok(out);
        }

        let summary = self.store.failure_summary().await?;
        let health = if summary.unresolved_count == 0 {
            "✅ All systems healthy!"
        } else if summary.unresolved_count > 10 {
            "⚠️ Attention needed!"
        } else {
            "Some open failures."
        };

        let mut out = format!(
            "{health}\nUnresolved: {}\nResolved: {}\n",
            summary.unresolved_count, summary.resolved_count
        );
        if !summary.top_tools.is_empty() {
            out.push_str("\nTop failing tools:\n");
            for (tool, count) in &summary.top_tools {
                out.push_str(&format!("- {tool}: {count}\n"));
            }
        }
        if !summary.top_error_kinds.is_empty() {
            out.push_str("\nTop error kinds:\n");
            for (kind, count) in &summary.top_error_kinds {
                out.push_str(&format!("- {kind}: {count}\n"));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn view_failure_log_reports_no_failures_when_empty() {
        let store = store().await;
        let out = ViewFailureLogTool::new(store).execute("u1", &json!({})).await.unwrap();
        assert_eq!(out, "No failures logged.");
    }

    #[tokio::test]
    async fn view_failure_log_lists_recorded_failure() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        let out = ViewFailureLogTool::new(store).execute("u1", &json!({})).await.unwrap();
        assert!(out.contains("send_email"));
        assert!(out.contains("timeout"));
    }

    #[tokio::test]
    async fn mark_resolved_closes_out_failure() {
        let store = store().await;
        let f = store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        let tool = MarkFailureResolvedTool::new(store.clone());
        tool.execute("u1", &json!({"failure_id": f.id, "resolution_notes": "added retry"}))
            .await
            .unwrap();
        let out = ViewFailureLogTool::new(store)
            .execute("u1", &json!({"unresolved_only": true}))
            .await
            .unwrap();
        assert_eq!(out, "No failures logged.");
    }

    #[tokio::test]
    async fn analyze_patterns_reports_healthy_when_no_unresolved() {
        let store = store().await;
        let out = AnalyzeFailurePatternsTool::new(store).execute("u1", &json!({})).await.unwrap();
        assert!(out.contains("All systems healthy"));
    }

    #[tokio::test]
    async fn analyze_patterns_warns_above_ten_unresolved() {
        let store = store().await;
        for i in 0..11 {
            store
                .record_failure(&format!("tool_{i}"), "timeout", "timed out", None, "u1", "discord")
                .await
                .unwrap();
        }
        let out = AnalyzeFailurePatternsTool::new(store).execute("u1", &json!({})).await.unwrap();
        assert!(out.contains("Attention needed"));
    }

    #[tokio::test]
    async fn analyze_patterns_filters_by_tool_name() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store
            .record_failure("web_search", "auth_error", "bad creds", None, "u1", "discord")
            .await
            .unwrap();
        let out = AnalyzeFailurePatternsTool::new(store)
            .execute("u1", &json!({"tool_name": "send_email"}))
            .await
            .unwrap();
        assert!(out.contains("send_email"));
        assert!(!out.contains("web_search"));
    }
}
