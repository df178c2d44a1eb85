// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation history: one row per user/platform session, messages kept in
//! arrival order and trimmed to the caller's requested window on read.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::connection::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub platform: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on assistant messages that requested one or more tool calls.
    pub tool_calls: Option<serde_json::Value>,
    /// Set on tool-result messages: the id of the assistant tool call being answered.
    pub tool_call_id: Option<String>,
    /// Set on tool-result messages: the name of the tool that produced it.
    pub name: Option<String>,
    pub created_at: String,
}

impl Store {
    /// Fetch the conversation for `(user_id, session_id, platform)`, creating
    /// one if it doesn't exist yet. `session_id` of `None` addresses the
    /// user's default (most recent, session-less) conversation on that
    /// platform.
    pub async fn get_or_create_conversation(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        platform: &str,
    ) -> anyhow::Result<Conversation> {
        let user_id = user_id.to_string();
        let session_id = session_id.map(str::to_string);
        let platform = platform.to_string();
        self.with_conn(move |conn| {
            let existing: Option<Conversation> = conn
                .query_row(
                    "SELECT id, user_id, session_id, platform, created_at, updated_at
                     FROM conversations
                     WHERE user_id = ?1 AND platform = ?2 AND session_id IS ?3",
                    params![user_id, platform, session_id],
                    row_to_conversation,
                )
                .optional()?;
            if let Some(conv) = existing {
                return Ok(conv);
            }

            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO conversations (id, user_id, session_id, platform, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, user_id, session_id, platform, now],
            )?;
            Ok(Conversation {
                id,
                user_id,
                session_id,
                platform,
                created_at: now.clone(),
                updated_at: now,
            })
        })
        .await
    }

    /// Append a plain message (no tool metadata) and bump the
    /// conversation's `updated_at`.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> anyhow::Result<()> {
        self.append_message_full(conversation_id, role, content, None, None, None).await
    }

    /// Append an assistant message that requested one or more tool calls.
    pub async fn append_tool_call_message(
        &self,
        conversation_id: &str,
        content: &str,
        tool_calls: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.append_message_full(conversation_id, Role::Assistant, content, Some(tool_calls), None, None)
            .await
    }

    /// Append the result of a tool execution, tagged with the call it answers.
    pub async fn append_tool_result(
        &self,
        conversation_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        content: &str,
    ) -> anyhow::Result<()> {
        self.append_message_full(
            conversation_id,
            Role::Tool,
            content,
            None,
            Some(tool_call_id.to_string()),
            Some(tool_name.to_string()),
        )
        .await
    }

    async fn append_message_full(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        tool_calls: Option<serde_json::Value>,
        tool_call_id: Option<String>,
        name: Option<String>,
    ) -> anyhow::Result<()> {
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        let tool_calls_json = tool_calls.map(|v| v.to_string());
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, tool_calls, tool_call_id, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![conversation_id, role.as_str(), content, tool_calls_json, tool_call_id, name, now],
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent `limit` messages, oldest first.
    pub async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, tool_calls, tool_call_id, name, created_at FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let mut rows: Vec<Message> = stmt
                .query_map(params![conversation_id, limit as i64], |row| {
                    let tool_calls_json: Option<String> = row.get(2)?;
                    Ok(Message {
                        role: Role::parse(&row.get::<_, String>(0)?),
                        content: row.get(1)?,
                        tool_calls: tool_calls_json.and_then(|s| serde_json::from_str(&s).ok()),
                        tool_call_id: row.get(3)?,
                        name: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            rows.reverse();
            Ok(rows)
        })
        .await
    }

    /// Delete all messages for a conversation, keeping the conversation row.
    pub async fn clear_conversation(&self, conversation_id: &str) -> anyhow::Result<()> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete all messages for every conversation a user has for
    /// `session_id`, regardless of platform. Conversations are created
    /// per-platform, so a user's history for one session is spread across
    /// as many rows as platforms they've talked to the agent on; this is
    /// the only way to actually clear "the user's history" rather than one
    /// platform's slice of it.
    pub async fn clear_messages_for_user(&self, user_id: &str, session_id: Option<&str>) -> anyhow::Result<()> {
        let user_id = user_id.to_string();
        let session_id = session_id.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM messages WHERE conversation_id IN (
                     SELECT id FROM conversations WHERE user_id = ?1 AND session_id IS ?2
                 )",
                params![user_id, session_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Conversations with the most recent activity, optionally restricted to
    /// a set of platforms. Used by the scheduler's stall-nudge checks and by
    /// skills grounding to see what a user has recently been doing.
    pub async fn recent_activity(
        &self,
        limit: usize,
        platforms: Option<Vec<String>>,
    ) -> anyhow::Result<Vec<Conversation>> {
        self.with_conn(move |conn| {
            let rows = match &platforms {
                Some(platforms) if !platforms.is_empty() => {
                    let placeholders = platforms.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                    let sql = format!(
                        "SELECT id, user_id, session_id, platform, created_at, updated_at
                         FROM conversations WHERE platform IN ({placeholders})
                         ORDER BY updated_at DESC LIMIT ?"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut params: Vec<&dyn rusqlite::ToSql> =
                        platforms.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
                    let limit_i64 = limit as i64;
                    params.push(&limit_i64);
                    stmt.query_map(params.as_slice(), row_to_conversation)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                _ => {
                    let mut stmt = conn.prepare(
                        "SELECT id, user_id, session_id, platform, created_at, updated_at
                         FROM conversations ORDER BY updated_at DESC LIMIT ?1",
                    )?;
                    stmt.query_map(params![limit as i64], row_to_conversation)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
        .await
    }
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        platform: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = store().await;
        let a = store
            .get_or_create_conversation("u1", None, "discord")
            .await
            .unwrap();
        let b = store
            .get_or_create_conversation("u1", None, "discord")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn distinct_sessions_get_distinct_conversations() {
        let store = store().await;
        let a = store
            .get_or_create_conversation("u1", Some("s1"), "discord")
            .await
            .unwrap();
        let b = store
            .get_or_create_conversation("u1", Some("s2"), "discord")
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn messages_come_back_in_chronological_order() {
        let store = store().await;
        let conv = store
            .get_or_create_conversation("u1", None, "discord")
            .await
            .unwrap();
        store.append_message(&conv.id, Role::User, "hi").await.unwrap();
        store
            .append_message(&conv.id, Role::Assistant, "hello")
            .await
            .unwrap();
        store.append_message(&conv.id, Role::User, "bye").await.unwrap();

        let msgs = store.recent_messages(&conv.id, 2).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "hello");
        assert_eq!(msgs[1].content, "bye");
    }

    #[tokio::test]
    async fn clear_conversation_drops_messages_but_keeps_row() {
        let store = store().await;
        let conv = store
            .get_or_create_conversation("u1", None, "discord")
            .await
            .unwrap();
        store.append_message(&conv.id, Role::User, "hi").await.unwrap();
        store.clear_conversation(&conv.id).await.unwrap();
        let msgs = store.recent_messages(&conv.id, 10).await.unwrap();
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn clear_messages_for_user_spans_every_platform() {
        let store = store().await;
        let discord = store.get_or_create_conversation("u1", None, "discord").await.unwrap();
        let telegram = store.get_or_create_conversation("u1", None, "telegram").await.unwrap();
        let other_user = store.get_or_create_conversation("u2", None, "discord").await.unwrap();
        store.append_message(&discord.id, Role::User, "hi from discord").await.unwrap();
        store.append_message(&telegram.id, Role::User, "hi from telegram").await.unwrap();
        store.append_message(&other_user.id, Role::User, "unrelated").await.unwrap();

        store.clear_messages_for_user("u1", None).await.unwrap();

        assert!(store.recent_messages(&discord.id, 10).await.unwrap().is_empty());
        assert!(store.recent_messages(&telegram.id, 10).await.unwrap().is_empty());
        assert_eq!(store.recent_messages(&other_user.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_messages_for_user_respects_session_id() {
        let store = store().await;
        let s1 = store.get_or_create_conversation("u1", Some("s1"), "discord").await.unwrap();
        let s2 = store.get_or_create_conversation("u1", Some("s2"), "discord").await.unwrap();
        store.append_message(&s1.id, Role::User, "in s1").await.unwrap();
        store.append_message(&s2.id, Role::User, "in s2").await.unwrap();

        store.clear_messages_for_user("u1", Some("s1")).await.unwrap();

        assert!(store.recent_messages(&s1.id, 10).await.unwrap().is_empty());
        assert_eq!(store.recent_messages(&s2.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_call_and_result_metadata_round_trips() {
        let store = store().await;
        let conv = store.get_or_create_conversation("u1", None, "discord").await.unwrap();
        let calls = serde_json::json!([{"id": "call_1", "name": "echo", "arguments": {"msg": "hi"}}]);
        store.append_tool_call_message(&conv.id, "", calls.clone()).await.unwrap();
        store.append_tool_result(&conv.id, "call_1", "echo", "hi").await.unwrap();

        let msgs = store.recent_messages(&conv.id, 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].tool_calls, Some(calls));
        assert_eq!(msgs[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msgs[1].name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn recent_activity_filters_by_platform() {
        let store = store().await;
        store
            .get_or_create_conversation("u1", None, "discord")
            .await
            .unwrap();
        store
            .get_or_create_conversation("u1", None, "telegram")
            .await
            .unwrap();

        let all = store.recent_activity(10, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let discord_only = store
            .recent_activity(10, Some(vec!["discord".to_string()]))
            .await
            .unwrap();
        assert_eq!(discord_only.len(), 1);
        assert_eq!(discord_only[0].platform, "discord");
    }
}
