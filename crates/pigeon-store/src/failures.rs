// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool failure log feeding the skills self-healing loop.
//!
//! Repeated failures of the same tool with the same error kind coalesce into
//! a single row with a growing `occurrence_count` rather than flooding the
//! log with near-duplicates; only a genuinely new `(tool_name, error_kind)`
//! pairing (or one that was previously marked resolved) opens a fresh entry.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::connection::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub id: String,
    pub timestamp: String,
    pub tool_name: String,
    pub error_kind: String,
    pub error_text: String,
    pub arguments: Option<String>,
    pub user_id: String,
    pub platform: String,
    pub occurrence_count: u32,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
}

impl Store {
    /// Record a tool failure, coalescing into the matching unresolved entry
    /// for the same `(tool_name, error_kind)` if one exists.
    pub async fn record_failure(
        &self,
        tool_name: &str,
        error_kind: &str,
        error_text: &str,
        arguments: Option<&str>,
        user_id: &str,
        platform: &str,
    ) -> anyhow::Result<FailureRecord> {
        let tool_name = tool_name.to_string();
        let error_kind = error_kind.to_string();
        let error_text = error_text.to_string();
        let arguments = arguments.map(str::to_string);
        let user_id = user_id.to_string();
        let platform = platform.to_string();

        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();

            let existing_id: Option<String> = conn
                .query_row(
                    "SELECT id FROM failures
                     WHERE tool_name = ?1 AND error_kind = ?2 AND resolved = 0",
                    params![tool_name, error_kind],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing_id {
                conn.execute(
                    "UPDATE failures SET
                        occurrence_count = occurrence_count + 1,
                        timestamp = ?1,
                        error_text = ?2,
                        arguments = ?3
                     WHERE id = ?4",
                    params![now, error_text, arguments, id],
                )?;
                return row_by_id(conn, &id);
            }

            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO failures
                    (id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 0)",
                params![id, now, tool_name, error_kind, error_text, arguments, user_id, platform],
            )?;
            row_by_id(conn, &id)
        })
        .await
    }

    pub async fn unresolved_failures(&self) -> anyhow::Result<Vec<FailureRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved, resolution_notes
                 FROM failures WHERE resolved = 0 ORDER BY occurrence_count DESC, timestamp DESC",
            )?;
            let rows = stmt.query_map([], row_to_failure)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn mark_resolved(&self, id: &str, notes: &str) -> anyhow::Result<()> {
        let id = id.to_string();
        let notes = notes.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE failures SET resolved = 1, resolution_notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent failures, newest first. `unresolved_only` restricts to
    /// open entries; otherwise resolved and unresolved are both included.
    pub async fn recent_failures(&self, limit: u32, unresolved_only: bool) -> anyhow::Result<Vec<FailureRecord>> {
        self.with_conn(move |conn| {
            let sql = if unresolved_only {
                "SELECT id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved, resolution_notes
                 FROM failures WHERE resolved = 0 ORDER BY timestamp DESC LIMIT ?1"
            } else {
                "SELECT id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved, resolution_notes
                 FROM failures ORDER BY timestamp DESC LIMIT ?1"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![limit], row_to_failure)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn failures_by_tool(&self, tool_name: &str) -> anyhow::Result<Vec<FailureRecord>> {
        let tool_name = tool_name.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved, resolution_notes
                 FROM failures WHERE tool_name = ?1 ORDER BY timestamp DESC",
            )?;
            let rows = stmt.query_map(params![tool_name], row_to_failure)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Aggregate view feeding the self-healing loop's diagnostic report:
    /// open/resolved totals plus the tools and error kinds failing most.
    pub async fn failure_summary(&self) -> anyhow::Result<FailureSummary> {
        self.with_conn(|conn| {
            let unresolved_count: u32 =
                conn.query_row("SELECT COUNT(*) FROM failures WHERE resolved = 0", [], |r| r.get(0))?;
            let resolved_count: u32 =
                conn.query_row("SELECT COUNT(*) FROM failures WHERE resolved = 1", [], |r| r.get(0))?;

            let mut tool_stmt = conn.prepare(
                "SELECT tool_name, SUM(occurrence_count) AS total
                 FROM failures WHERE resolved = 0
                 GROUP BY tool_name ORDER BY total DESC LIMIT 5",
            )?;
            let top_tools = tool_stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut kind_stmt = conn.prepare(
                "SELECT error_kind, SUM(occurrence_count) AS total
                 FROM failures WHERE resolved = 0
                 GROUP BY error_kind ORDER BY total DESC LIMIT 5",
            )?;
            let top_error_kinds = kind_stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(FailureSummary { unresolved_count, resolved_count, top_tools, top_error_kinds })
        })
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureSummary {
    pub unresolved_count: u32,
    pub resolved_count: u32,
    /// `(tool_name, total_occurrences)`, highest first.
    pub top_tools: Vec<(String, u32)>,
    /// `(error_kind, total_occurrences)`, highest first.
    pub top_error_kinds: Vec<(String, u32)>,
}

fn row_by_id(conn: &rusqlite::Connection, id: &str) -> anyhow::Result<FailureRecord> {
    Ok(conn.query_row(
        "SELECT id, timestamp, tool_name, error_kind, error_text, arguments, user_id, platform, occurrence_count, resolved, resolution_notes
         FROM failures WHERE id = ?1",
        params![id],
        row_to_failure,
    )?)
}

fn row_to_failure(row: &rusqlite::Row) -> rusqlite::Result<FailureRecord> {
    Ok(FailureRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        tool_name: row.get(2)?,
        error_kind: row.get(3)?,
        error_text: row.get(4)?,
        arguments: row.get(5)?,
        user_id: row.get(6)?,
        platform: row.get(7)?,
        occurrence_count: row.get(8)?,
        resolved: row.get::<_, i64>(9)? != 0,
        resolution_notes: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn first_failure_starts_at_occurrence_one() {
        let store = store().await;
        let f = store
            .record_failure("send_email", "timeout", "connect timed out", None, "u1", "discord")
            .await
            .unwrap();
        assert_eq!(f.occurrence_count, 1);
    }

    #[tokio::test]
    async fn repeated_failure_coalesces() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        let second = store
            .record_failure("send_email", "timeout", "timed out again", None, "u1", "discord")
            .await
            .unwrap();
        assert_eq!(second.occurrence_count, 2);

        let unresolved = store.unresolved_failures().await.unwrap();
        assert_eq!(unresolved.len(), 1);
    }

    #[tokio::test]
    async fn resolved_failure_does_not_coalesce_with_new_occurrence() {
        let store = store().await;
        let first = store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store.mark_resolved(&first.id, "fixed retry logic").await.unwrap();

        let second = store
            .record_failure("send_email", "timeout", "timed out again", None, "u1", "discord")
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.occurrence_count, 1);
    }

    #[tokio::test]
    async fn distinct_error_kinds_do_not_coalesce() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store
            .record_failure("send_email", "auth_error", "bad credentials", None, "u1", "discord")
            .await
            .unwrap();
        let unresolved = store.unresolved_failures().await.unwrap();
        assert_eq!(unresolved.len(), 2);
    }

    #[tokio::test]
    async fn by_tool_returns_only_matching_tool() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store
            .record_failure("web_search", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        let matches = store.failures_by_tool("send_email").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tool_name, "send_email");
    }

    #[tokio::test]
    async fn recent_failures_respects_unresolved_only_and_limit() {
        let store = store().await;
        let first = store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store.mark_resolved(&first.id, "fixed").await.unwrap();
        store
            .record_failure("web_search", "auth_error", "bad creds", None, "u1", "discord")
            .await
            .unwrap();

        let unresolved_only = store.recent_failures(10, true).await.unwrap();
        assert_eq!(unresolved_only.len(), 1);
        assert_eq!(unresolved_only[0].tool_name, "web_search");

        let all = store.recent_failures(1, false).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn summary_aggregates_unresolved_counts_by_tool_and_kind() {
        let store = store().await;
        store
            .record_failure("send_email", "timeout", "timed out", None, "u1", "discord")
            .await
            .unwrap();
        store
            .record_failure("send_email", "timeout", "timed out again", None, "u1", "discord")
            .await
            .unwrap();
        let resolved = store
            .record_failure("web_search", "auth_error", "bad creds", None, "u1", "discord")
            .await
            .unwrap();
        store.mark_resolved(&resolved.id, "rotated key").await.unwrap();

        let summary = store.failure_summary().await.unwrap();
        assert_eq!(summary.unresolved_count, 1);
        assert_eq!(summary.resolved_count, 1);
        assert_eq!(summary.top_tools, vec![("send_email".to_string(), 2)]);
        assert_eq!(summary.top_error_kinds, vec![("timeout".to_string(), 2)]);
    }
}
