// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Long-lived facts the agent has learned about a user, keyed by
//! `(user_id, memory_type, key)`. Unlike conversation history this is meant
//! to survive indefinitely and to be folded into every prompt.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::connection::Store;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Core,
    Preference,
    Fact,
    Context,
    Relationship,
    Custom,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Core => "core",
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Context => "context",
            MemoryType::Relationship => "relationship",
            MemoryType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "core" => MemoryType::Core,
            "preference" => MemoryType::Preference,
            "context" => MemoryType::Context,
            "relationship" => MemoryType::Relationship,
            "custom" => MemoryType::Custom,
            _ => MemoryType::Fact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub user_id: String,
    pub memory_type: MemoryType,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Store {
    /// Upsert a memory entry. A repeated `(user_id, memory_type, key)` updates
    /// the value and `updated_at` in place rather than duplicating the row.
    pub async fn set_memory(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        key: &str,
        value: &str,
        confidence: f64,
        source: &str,
    ) -> anyhow::Result<()> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        let value = value.to_string();
        let source = source.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO user_memories (user_id, memory_type, key, value, confidence, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(user_id, memory_type, key) DO UPDATE SET
                    value = excluded.value,
                    confidence = excluded.confidence,
                    source = excluded.source,
                    updated_at = excluded.updated_at",
                params![user_id, memory_type.as_str(), key, value, confidence, source, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_memory(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        key: &str,
    ) -> anyhow::Result<Option<MemoryEntry>> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            use rusqlite::OptionalExtension;
            let entry = conn
                .query_row(
                    "SELECT user_id, memory_type, key, value, confidence, source, created_at, updated_at
                     FROM user_memories WHERE user_id = ?1 AND memory_type = ?2 AND key = ?3",
                    params![user_id, memory_type.as_str(), key],
                    row_to_memory,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    pub async fn memories_by_type(
        &self,
        user_id: &str,
        memory_type: MemoryType,
    ) -> anyhow::Result<Vec<MemoryEntry>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, memory_type, key, value, confidence, source, created_at, updated_at
                 FROM user_memories WHERE user_id = ?1 AND memory_type = ?2 ORDER BY key",
            )?;
            let rows = stmt
                .query_map(params![user_id, memory_type.as_str()], row_to_memory)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn all_memories(&self, user_id: &str) -> anyhow::Result<Vec<MemoryEntry>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, memory_type, key, value, confidence, source, created_at, updated_at
                 FROM user_memories WHERE user_id = ?1 ORDER BY memory_type, key",
            )?;
            let rows = stmt
                .query_map(params![user_id], row_to_memory)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn delete_memory(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        key: &str,
    ) -> anyhow::Result<bool> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM user_memories WHERE user_id = ?1 AND memory_type = ?2 AND key = ?3",
                params![user_id, memory_type.as_str(), key],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Render a user's memories as a prompt-ready block, grouped by type.
    /// Returns `None` when the user has no stored memories so callers can
    /// omit the section entirely rather than inject an empty header.
    pub async fn format_memories_for_prompt(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        let entries = self.all_memories(user_id).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let mut out = String::from("# What you know about this user\n");
        let mut current: Option<MemoryType> = None;
        for entry in &entries {
            if current != Some(entry.memory_type) {
                out.push_str(&format!("\n## {}\n", entry.memory_type.as_str()));
                current = Some(entry.memory_type);
            }
            out.push_str(&format!("- {}: {}\n", entry.key, entry.value));
        }
        Ok(Some(out))
    }
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
    Ok(MemoryEntry {
        user_id: row.get(0)?,
        memory_type: MemoryType::parse(&row.get::<_, String>(1)?),
        key: row.get(2)?,
        value: row.get(3)?,
        confidence: row.get(4)?,
        source: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = store().await;
        store
            .set_memory("u1", MemoryType::Preference, "timezone", "UTC+2", 1.0, "user")
            .await
            .unwrap();
        let got = store
            .get_memory("u1", MemoryType::Preference, "timezone")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.value, "UTC+2");
    }

    #[tokio::test]
    async fn repeated_set_updates_in_place() {
        let store = store().await;
        store
            .set_memory("u1", MemoryType::Fact, "pet", "cat", 1.0, "user")
            .await
            .unwrap();
        store
            .set_memory("u1", MemoryType::Fact, "pet", "dog", 0.9, "inferred")
            .await
            .unwrap();
        let all = store.memories_by_type("u1", MemoryType::Fact).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "dog");
        assert_eq!(all[0].source, "inferred");
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = store().await;
        store
            .set_memory("u1", MemoryType::Fact, "pet", "cat", 1.0, "user")
            .await
            .unwrap();
        let deleted = store.delete_memory("u1", MemoryType::Fact, "pet").await.unwrap();
        assert!(deleted);
        assert!(store
            .get_memory("u1", MemoryType::Fact, "pet")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn format_for_prompt_is_none_when_empty() {
        let store = store().await;
        assert!(store.format_memories_for_prompt("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn format_for_prompt_groups_by_type() {
        let store = store().await;
        store
            .set_memory("u1", MemoryType::Fact, "pet", "cat", 1.0, "user")
            .await
            .unwrap();
        store
            .set_memory("u1", MemoryType::Preference, "timezone", "UTC+2", 1.0, "user")
            .await
            .unwrap();
        let block = store.format_memories_for_prompt("u1").await.unwrap().unwrap();
        assert!(block.contains("## fact"));
        assert!(block.contains("## preference"));
        assert!(block.contains("pet: cat"));
    }
}
