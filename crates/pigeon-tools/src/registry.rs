// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Central registry holding all available tools, keyed by name.
//!
//! The registry is built once at startup by a `ToolProvider` and handed to
//! the agent; after that it is read-only, so lookups need no lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tool::{schema_of, Tool, ToolSchema};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateName(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool, failing if its name collides with one already held.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    /// Same as [`Self::register`], for a tool a `ToolProvider` already
    /// handed back wrapped in an `Arc`.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| schema_of(t.as_ref())).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch by name, surfacing `UnknownTool` for anything not registered.
    pub async fn execute(
        &self,
        name: &str,
        user_id: &str,
        args: &Value,
    ) -> Result<anyhow::Result<String>, RegistryError> {
        match self.tools.get(name) {
            Some(tool) => Ok(tool.execute(user_id, args).await),
            None => Err(RegistryError::UnknownTool(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
            Ok(format!("echo:{args}"))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" }).unwrap();
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" }).unwrap();
        let err = reg.register(EchoTool { name: "echo" }).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "echo"));
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "b" }).unwrap();
        reg.register(EchoTool { name: "a" }).unwrap();
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" }).unwrap();
        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "my_tool");
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" }).unwrap();
        let result = reg.execute("echo", "u1", &json!({"x": 1})).await.unwrap();
        assert_eq!(result.unwrap(), "echo:{\"x\":1}");
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_an_error() {
        let reg = ToolRegistry::new();
        let err = reg.execute("missing", "u1", &json!({})).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTool(name) if name == "missing"));
    }
}
