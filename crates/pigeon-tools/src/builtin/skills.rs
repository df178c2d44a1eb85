// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools that let the model teach itself: writing a new skill after
//! figuring out how to use a tool correctly, viewing what it already knows,
//! and revising a skill that turned out to be wrong. `CreateSkillTool`
//! drops a skill straight into `learned/`; `LearnSkillTool` is the same
//! but for skills proposed during human review and files into `pending/`
//! instead, awaiting approval through the platform adapter.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use pigeon_skills::{Skill, SkillExample, SkillsManager};

use crate::tool::Tool;

fn parse_examples(args: &Value) -> Vec<SkillExample> {
    args.get("examples")
        .and_then(Value::as_array)
        .map(|examples| {
            examples
                .iter()
                .filter_map(|e| {
                    let user = e.get("user")?.as_str()?.to_string();
                    let tool_call = e.get("tool_call")?.clone();
                    Some(SkillExample { user, tool_call })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn new_skill(args: &Value, source: &str) -> anyhow::Result<Skill> {
    let name = args.get("name").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'name'"))?;
    let tool = args.get("tool").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'tool'"))?;
    let instructions = args
        .get("instructions")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing 'instructions'"))?;
    let triggers: Vec<String> = args
        .get("triggers")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let now = Utc::now().to_rfc3339();
    Ok(Skill {
        id: format!("skill_{}", Uuid::new_v4()),
        name: name.to_string(),
        tool: tool.to_string(),
        triggers,
        examples: parse_examples(args),
        instructions: instructions.to_string(),
        created_at: now.clone(),
        updated_at: now,
        source: source.to_string(),
        status: pigeon_skills::SkillStatus::Pending,
        success_count: 0,
        failure_count: 0,
        is_directory: false,
        readme: None,
        reference: None,
    })
}

fn skill_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "description": "Short human-readable skill name"},
            "tool": {"type": "string", "description": "The tool this skill applies to"},
            "triggers": {"type": "array", "items": {"type": "string"}, "description": "Phrases that should surface this skill"},
            "instructions": {"type": "string", "description": "What to do differently next time"},
            "examples": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"user": {"type": "string"}, "tool_call": {"type": "object"}},
                },
            },
        },
        "required": ["name", "tool", "instructions"],
    })
}

pub struct CreateSkillTool {
    skills: SkillsManager,
}

impl CreateSkillTool {
    pub fn new(skills: SkillsManager) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for CreateSkillTool {
    fn name(&self) -> &str {
        "create_skill"
    }
    fn description(&self) -> &str {
        "Save a skill directly to your learned skills, no approval needed. Use this for \
         minor corrections you're confident about."
    }
    fn parameters_schema(&self) -> Value {
        skill_schema()
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let mut skill = new_skill(args, "agent")?;
        skill.status = pigeon_skills::SkillStatus::Approved;
        let path = self.skills.add_learned_skill(skill.clone()).await?;
        Ok(format!("Learned skill '{}' ({}), saved to {}.", skill.name, skill.id, path.display()))
    }
}

pub struct LearnSkillTool {
    skills: SkillsManager,
}

impl LearnSkillTool {
    pub fn new(skills: SkillsManager) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for LearnSkillTool {
    fn name(&self) -> &str {
        "learn_skill"
    }
    fn description(&self) -> &str {
        "Propose a new skill for human approval before it's added to your learned skills. Use \
         this when you're not fully confident the lesson generalizes."
    }
    fn parameters_schema(&self) -> Value {
        skill_schema()
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let skill = new_skill(args, "agent")?;
        let path = self.skills.add_pending_skill(skill.clone()).await?;
        Ok(format!(
            "Proposed skill '{}' ({}) pending approval, saved to {}.",
            skill.name,
            skill.id,
            path.display()
        ))
    }
}

pub struct ViewSkillsTool {
    skills: SkillsManager,
}

impl ViewSkillsTool {
    pub fn new(skills: SkillsManager) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for ViewSkillsTool {
    fn name(&self) -> &str {
        "view_skills"
    }
    fn description(&self) -> &str {
        "List skills you've learned, optionally filtered to a specific tool."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"tool": {"type": "string"}}, "required": []})
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let skills = match args.get("tool").and_then(Value::as_str) {
            Some(tool) => self.skills.skills_for_tool(tool).await?,
            None => self.skills.all_skills().await?,
        };
        if skills.is_empty() {
            return Ok("No learned skills yet.".to_string());
        }
        let mut out = String::new();
        for skill in skills {
            out.push_str(&format!("- [{}] {} ({}): {}\n", skill.id, skill.name, skill.tool, skill.instructions));
        }
        Ok(out)
    }
}

pub struct UpdateSkillTool {
    skills: SkillsManager,
}

impl UpdateSkillTool {
    pub fn new(skills: SkillsManager) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for UpdateSkillTool {
    fn name(&self) -> &str {
        "update_skill"
    }
    fn description(&self) -> &str {
        "Revise an existing skill: add a trigger phrase and/or replace its instructions."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "skill_id": {"type": "string"},
                "add_trigger": {"type": "string"},
                "new_instructions": {"type": "string"},
            },
            "required": ["skill_id"],
        })
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let skill_id = args.get("skill_id").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'skill_id'"))?;
        let add_trigger = args.get("add_trigger").and_then(Value::as_str);
        let new_instructions = args.get("new_instructions").and_then(Value::as_str);
        if self.skills.update_skill(skill_id, add_trigger, new_instructions).await? {
            Ok(format!("Updated skill {skill_id}."))
        } else {
            Ok(format!("No skill found with id '{skill_id}'."))
        }
    }
}

pub struct DocumentLimitationTool {
    skills: SkillsManager,
}

impl DocumentLimitationTool {
    pub fn new(skills: SkillsManager) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for DocumentLimitationTool {
    fn name(&self) -> &str {
        "document_limitation"
    }
    fn description(&self) -> &str {
        "Record a limitation you've hit that has no easy fix — something you can't do with \
         the tools you have. This is saved as a learned skill so future runs recognize the \
         situation instead of repeating the same failed attempt."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "tool": {"type": "string"},
                "triggers": {"type": "array", "items": {"type": "string"}},
                "description": {"type": "string", "description": "What the limitation is"},
                "workaround": {"type": "string", "description": "Best available workaround, if any"},
                "needed_capability": {"type": "string", "description": "What would actually fix this"},
            },
            "required": ["name", "tool", "description"],
        })
    }
    async fn execute(&self, _user_id: &str, args: &Value) -> anyhow::Result<String> {
        let name = args.get("name").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'name'"))?;
        let tool = args.get("tool").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing 'tool'"))?;
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing 'description'"))?;
        let workaround = args.get("workaround").and_then(Value::as_str);
        let needed_capability = args.get("needed_capability").and_then(Value::as_str);
        let triggers: Vec<String> = args
            .get("triggers")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut instructions = format!("Known limitation: {description}\n");
        if let Some(workaround) = workaround {
            instructions.push_str(&format!("\nWorkaround: {workaround}\n"));
        }
        if let Some(needed) = needed_capability {
            instructions.push_str(&format!("\nWhat would fix this: {needed}\n"));
        }

        let now = Utc::now().to_rfc3339();
        let skill = Skill {
            id: format!("skill_{}", Uuid::new_v4()),
            name: name.to_string(),
            tool: tool.to_string(),
            triggers,
            examples: Vec::new(),
            instructions,
            created_at: now.clone(),
            updated_at: now,
            source: "agent".to_string(),
            status: pigeon_skills::SkillStatus::Approved,
            success_count: 0,
            failure_count: 0,
            is_directory: false,
            readme: None,
            reference: None,
        };
        let path = self.skills.add_learned_skill(skill.clone()).await?;
        Ok(format!("Documented limitation '{}' ({}), saved to {}.", skill.name, skill.id, path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn skills() -> (SkillsManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (SkillsManager::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn create_skill_lands_in_learned() {
        let (skills, _dir) = skills();
        let tool = CreateSkillTool::new(skills.clone());
        let out = tool
            .execute(
                "u1",
                &json!({"name": "Weather lookups", "tool": "web_search", "instructions": "Always search for weather"}),
            )
            .await
            .unwrap();
        assert!(out.contains("Learned skill"));
        assert_eq!(skills.all_skills().await.unwrap().len(), 1);
        assert!(skills.pending_skills().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn learn_skill_lands_in_pending() {
        let (skills, _dir) = skills();
        let tool = LearnSkillTool::new(skills.clone());
        tool.execute(
            "u1",
            &json!({"name": "Weather lookups", "tool": "web_search", "instructions": "Always search for weather"}),
        )
        .await
        .unwrap();
        assert!(skills.all_skills().await.unwrap().is_empty());
        assert_eq!(skills.pending_skills().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn view_skills_filters_by_tool() {
        let (skills, _dir) = skills();
        CreateSkillTool::new(skills.clone())
            .execute("u1", &json!({"name": "A", "tool": "web_search", "instructions": "x"}))
            .await
            .unwrap();
        CreateSkillTool::new(skills.clone())
            .execute("u1", &json!({"name": "B", "tool": "send_email", "instructions": "y"}))
            .await
            .unwrap();
        let view = ViewSkillsTool::new(skills.clone());
        let out = view.execute("u1", &json!({"tool": "web_search"})).await.unwrap();
        assert!(out.contains('A'));
        assert!(!out.contains('B'));
    }

    #[tokio::test]
    async fn update_skill_adds_trigger() {
        let (skills, _dir) = skills();
        CreateSkillTool::new(skills.clone())
            .execute("u1", &json!({"name": "A", "tool": "web_search", "instructions": "x"}))
            .await
            .unwrap();
        let id = skills.all_skills().await.unwrap()[0].id.clone();
        let update = UpdateSkillTool::new(skills.clone());
        let out = update.execute("u1", &json!({"skill_id": id, "add_trigger": "forecast"})).await.unwrap();
        assert!(out.contains("Updated"));
        assert!(skills.all_skills().await.unwrap()[0].triggers.contains(&"forecast".to_string()));
    }

    #[tokio::test]
    async fn document_limitation_is_saved_as_learned_skill() {
        let (skills, _dir) = skills();
        let tool = DocumentLimitationTool::new(skills.clone());
        let out = tool
            .execute(
                "u1",
                &json!({
                    "name": "No PDF export",
                    "tool": "write_report",
                    "description": "write_report cannot produce a PDF, only markdown",
                    "workaround": "render the markdown and tell the user to convert it themselves",
                }),
            )
            .await
            .unwrap();
        assert!(out.contains("Documented limitation"));
        let saved = &skills.all_skills().await.unwrap()[0];
        assert!(saved.instructions.contains("Workaround"));
    }
}
