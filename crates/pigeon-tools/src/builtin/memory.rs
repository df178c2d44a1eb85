// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools that let the model read and write the user memory store directly,
//! in addition to the memory block composed automatically into every
//! prompt (see `pigeon_core::prompts`).

use async_trait::async_trait;
use serde_json::{json, Value};

use pigeon_store::{MemoryType, Store};

use crate::tool::Tool;

fn memory_type_arg(args: &Value) -> MemoryType {
    args.get("memory_type").and_then(Value::as_str).map(MemoryType::parse).unwrap_or(MemoryType::Fact)
}

pub struct RememberTool {
    store: Store,
}

impl RememberTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }
    fn description(&self) -> &str {
        "Save information about the user to memory. Use this to remember their name, \
         preferences, or anything they want you to remember."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "A short key for this memory, e.g. 'user_name'"},
                "value": {"type": "string", "description": "The information to remember"},
                "memory_type": {
                    "type": "string",
                    "enum": ["core", "preference", "fact", "context", "relationship", "custom"],
                    "default": "fact",
                },
            },
            "required": ["key", "value"],
        })
    }
    async fn execute(&self, user_id: &str, args: &Value) -> anyhow::Result<String> {
        let key = args.get("key").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'key'"))?;
        let value = args.get("value").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'value'"))?;
        let memory_type = memory_type_arg(args);
        self.store.set_memory(user_id, memory_type, key, value, 1.0, "agent").await?;
        Ok(format!("Remembered: {key} = {value}"))
    }
}

pub struct RecallTool {
    store: Store,
}

impl RecallTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        "recall"
    }
    fn description(&self) -> &str {
        "Retrieve a specific memory about the user by key."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "memory_type": {
                    "type": "string",
                    "enum": ["core", "preference", "fact", "context", "relationship", "custom"],
                    "default": "fact",
                },
            },
            "required": ["key"],
        })
    }
    async fn execute(&self, user_id: &str, args: &Value) -> anyhow::Result<String> {
        let key = args.get("key").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'key'"))?;
        let memory_type = memory_type_arg(args);
        match self.store.get_memory(user_id, memory_type, key).await? {
            Some(mem) => Ok(format!("{}: {} (type: {})", mem.key, mem.value, mem.memory_type.as_str())),
            None => Ok(format!("No memory found with key '{key}'")),
        }
    }
}

pub struct ListMemoriesTool {
    store: Store,
}

impl ListMemoriesTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListMemoriesTool {
    fn name(&self) -> &str {
        "list_memories"
    }
    fn description(&self) -> &str {
        "List all saved memories about the user."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }
    async fn execute(&self, user_id: &str, _args: &Value) -> anyhow::Result<String> {
        match self.store.format_memories_for_prompt(user_id).await? {
            Some(text) => Ok(text),
            None => Ok("No memories stored for this user yet.".to_string()),
        }
    }
}

pub struct ForgetTool {
    store: Store,
}

impl ForgetTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ForgetTool {
    fn name(&self) -> &str {
        "forget"
    }
    fn description(&self) -> &str {
        "Delete a specific memory about the user. Use this when the user asks you to forget something."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "memory_type": {
                    "type": "string",
                    "enum": ["core", "preference", "fact", "context", "relationship", "custom"],
                    "default": "fact",
                },
            },
            "required": ["key"],
        })
    }
    async fn execute(&self, user_id: &str, args: &Value) -> anyhow::Result<String> {
        let key = args.get("key").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'key'"))?;
        let memory_type = memory_type_arg(args);
        if self.store.delete_memory(user_id, memory_type, key).await? {
            Ok(format!("Forgotten: {key}"))
        } else {
            Ok(format!("No memory found with key '{key}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn remember_then_recall_round_trips() {
        let store = store().await;
        let remember = RememberTool::new(store.clone());
        remember.execute("u1", &json!({"key": "name", "value": "Ada"})).await.unwrap();

        let recall = RecallTool::new(store);
        let out = recall.execute("u1", &json!({"key": "name"})).await.unwrap();
        assert!(out.contains("Ada"));
    }

    #[tokio::test]
    async fn recall_missing_key_says_so() {
        let store = store().await;
        let recall = RecallTool::new(store);
        let out = recall.execute("u1", &json!({"key": "nope"})).await.unwrap();
        assert!(out.contains("No memory found"));
    }

    #[tokio::test]
    async fn forget_deletes_remembered_value() {
        let store = store().await;
        RememberTool::new(store.clone()).execute("u1", &json!({"key": "name", "value": "Ada"})).await.unwrap();
        let forget = ForgetTool::new(store.clone());
        let out = forget.execute("u1", &json!({"key": "name"})).await.unwrap();
        assert!(out.contains("Forgotten"));
        let recall = RecallTool::new(store);
        assert!(recall.execute("u1", &json!({"key": "name"})).await.unwrap().contains("No memory found"));
    }

    #[tokio::test]
    async fn list_memories_empty_has_friendly_message() {
        let store = store().await;
        let out = ListMemoriesTool::new(store).execute("u1", &json!({})).await.unwrap();
        assert!(out.contains("No memories"));
    }

    #[tokio::test]
    async fn recall_respects_memory_type() {
        let store = store().await;
        RememberTool::new(store.clone())
            .execute("u1", &json!({"key": "tz", "value": "UTC+2", "memory_type": "preference"}))
            .await
            .unwrap();
        let recall = RecallTool::new(store);
        let out = recall.execute("u1", &json!({"key": "tz"})).await.unwrap();
        assert!(out.contains("No memory found"), "default memory_type lookup should not see a preference-typed entry");
        let out = recall
            .execute("u1", &json!({"key": "tz", "memory_type": "preference"}))
            .await
            .unwrap();
        assert!(out.contains("UTC+2"));
    }
}
