// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The skill type and its on-disk markdown representation.
//!
//! A simple skill is one markdown file: a YAML front-matter header followed
//! by the instructions as free text body. A "complex" skill — one
//! documenting a multi-step pattern or a limitation with no easy fix — is a
//! directory with the same front matter in `skill.md` plus `README.md` and
//! `reference.md` alongside it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Pending,
    Approved,
}

impl SkillStatus {
    pub fn dir_name(self) -> &'static str {
        match self {
            SkillStatus::Pending => "pending",
            SkillStatus::Approved => "learned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillExample {
    pub user: String,
    pub tool_call: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub tool: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub examples: Vec<SkillExample>,
    pub instructions: String,
    pub created_at: String,
    pub updated_at: String,
    pub source: String,
    pub status: SkillStatus,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Skill {
    /// Does any trigger phrase occur (case-insensitively) in `message`?
    pub fn matches(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.triggers.iter().any(|t| !t.is_empty() && lower.contains(&t.to_lowercase()))
    }
}

/// Front-matter fields, kept separate from `instructions` so `to_markdown`
/// and `from_markdown` round-trip through the same serde model the YAML
/// block itself uses.
#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    id: String,
    name: String,
    tool: String,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    examples: Vec<SkillExample>,
    created_at: String,
    updated_at: String,
    source: String,
    status: SkillStatus,
    #[serde(default)]
    success_count: u32,
    #[serde(default)]
    failure_count: u32,
    #[serde(default)]
    is_directory: bool,
}

pub fn to_markdown(skill: &Skill) -> anyhow::Result<String> {
    let front = FrontMatter {
        id: skill.id.clone(),
        name: skill.name.clone(),
        tool: skill.tool.clone(),
        triggers: skill.triggers.clone(),
        examples: skill.examples.clone(),
        created_at: skill.created_at.clone(),
        updated_at: skill.updated_at.clone(),
        source: skill.source.clone(),
        status: skill.status,
        success_count: skill.success_count,
        failure_count: skill.failure_count,
        is_directory: skill.is_directory,
    };
    let yaml = serde_yaml::to_string(&front)?;
    Ok(format!("---\n{yaml}---\n\n{}\n", skill.instructions))
}

pub fn from_markdown(text: &str) -> anyhow::Result<Skill> {
    let mut parts = text.splitn(3, "---\n");
    let _leading = parts.next().unwrap_or("");
    let yaml = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("skill markdown missing YAML front matter"))?;
    let body = parts.next().unwrap_or("").trim().to_string();

    let front: FrontMatter = serde_yaml::from_str(yaml)?;
    Ok(Skill {
        id: front.id,
        name: front.name,
        tool: front.tool,
        triggers: front.triggers,
        examples: front.examples,
        instructions: body,
        created_at: front.created_at,
        updated_at: front.updated_at,
        source: front.source,
        status: front.status,
        success_count: front.success_count,
        failure_count: front.failure_count,
        is_directory: front.is_directory,
        readme: None,
        reference: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Skill {
        Skill {
            id: "skill_1".into(),
            name: "Check Weather".into(),
            tool: "web_search".into(),
            triggers: vec!["weather".into(), "forecast".into()],
            examples: vec![SkillExample {
                user: "what's the weather".into(),
                tool_call: serde_json::json!({"name": "web_search", "arguments": {"query": "weather"}}),
            }],
            instructions: "Always use web_search for weather questions.".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            source: "agent".into(),
            status: SkillStatus::Approved,
            success_count: 0,
            failure_count: 0,
            is_directory: false,
            readme: None,
            reference: None,
        }
    }

    #[test]
    fn markdown_round_trips() {
        let skill = sample();
        let md = to_markdown(&skill).unwrap();
        let parsed = from_markdown(&md).unwrap();
        assert_eq!(parsed, skill);
    }

    #[test]
    fn matches_is_case_insensitive() {
        let skill = sample();
        assert!(skill.matches("What's the WEATHER like today?"));
        assert!(!skill.matches("send an email"));
    }

    #[test]
    fn malformed_markdown_is_an_error() {
        let err = from_markdown("no front matter here").unwrap_err();
        assert!(err.to_string().contains("front matter"));
    }
}
