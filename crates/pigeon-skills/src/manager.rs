// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Loads, saves and matches skills against the `pending/` and `learned/`
//! directories under the configured skills root.
//!
//! Skills are read fresh from disk on every call rather than cached in
//! memory: this is a locally-hosted, low-throughput agent and a human may
//! be editing skill files by hand while the agent runs, so staleness is a
//! worse failure mode than a few extra directory scans.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::skill::{from_markdown, to_markdown, Skill, SkillStatus};

#[derive(Clone)]
pub struct SkillsManager {
    skills_dir: PathBuf,
}

impl SkillsManager {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self { skills_dir: skills_dir.into() }
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    /// All approved (`learned/`) skills, simple files and directories alike.
    pub async fn all_skills(&self) -> anyhow::Result<Vec<Skill>> {
        self.load_status_dir(SkillStatus::Approved).await
    }

    pub async fn pending_skills(&self) -> anyhow::Result<Vec<Skill>> {
        self.load_status_dir(SkillStatus::Pending).await
    }

    pub async fn skills_for_tool(&self, tool: &str) -> anyhow::Result<Vec<Skill>> {
        let tool = tool.to_string();
        Ok(self.all_skills().await?.into_iter().filter(|s| s.tool == tool).collect())
    }

    pub async fn get_skill(&self, id: &str) -> anyhow::Result<Option<Skill>> {
        for status in [SkillStatus::Approved, SkillStatus::Pending] {
            if let Some(skill) = self.load_status_dir(status).await?.into_iter().find(|s| s.id == id) {
                return Ok(Some(skill));
            }
        }
        Ok(None)
    }

    /// Skills whose triggers match `message`, approved skills only.
    pub async fn find_matching_skills(&self, message: &str) -> anyhow::Result<Vec<Skill>> {
        let message = message.to_string();
        Ok(self.all_skills().await?.into_iter().filter(|s| s.matches(&message)).collect())
    }

    /// Render matched skills as a prompt-ready auxiliary block, or `None`
    /// when nothing matches so the caller can omit the section.
    pub async fn prompt_section(&self, message: &str) -> anyhow::Result<Option<String>> {
        let matches = self.find_matching_skills(message).await?;
        if matches.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("# Skills you have learned\n");
        for skill in &matches {
            out.push_str(&format!("\n## {}\n{}\n", skill.name, skill.instructions));
        }
        Ok(Some(out))
    }

    /// Save a new skill directly into `learned/` — used when a skill is
    /// taught from explicit user feedback and needs no approval step.
    pub async fn add_learned_skill(&self, mut skill: Skill) -> anyhow::Result<PathBuf> {
        skill.status = SkillStatus::Approved;
        self.save(&skill).await
    }

    /// Save a new skill into `pending/`, awaiting human approval.
    pub async fn add_pending_skill(&self, mut skill: Skill) -> anyhow::Result<PathBuf> {
        skill.status = SkillStatus::Pending;
        self.save(&skill).await
    }

    /// Move a pending skill into `learned/`.
    pub async fn approve_skill(&self, id: &str) -> anyhow::Result<()> {
        let mut skill = self
            .get_skill(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("skill {id} not found"))?;
        if skill.status == SkillStatus::Approved {
            return Ok(());
        }
        self.remove(&skill).await?;
        skill.status = SkillStatus::Approved;
        self.save(&skill).await?;
        Ok(())
    }

    pub async fn reject_skill(&self, id: &str) -> anyhow::Result<()> {
        let skill = self
            .get_skill(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("skill {id} not found"))?;
        self.remove(&skill).await
    }

    /// Add a trigger and/or replace the instructions on an existing skill.
    pub async fn update_skill(
        &self,
        id: &str,
        add_trigger: Option<&str>,
        new_instructions: Option<&str>,
    ) -> anyhow::Result<bool> {
        let Some(mut skill) = self.get_skill(id).await? else {
            return Ok(false);
        };
        if let Some(trigger) = add_trigger {
            let lower = trigger.to_lowercase();
            if !skill.triggers.iter().any(|t| t == &lower) {
                skill.triggers.push(lower);
            }
        }
        if let Some(instructions) = new_instructions {
            skill.instructions = instructions.to_string();
        }
        skill.updated_at = Utc::now().to_rfc3339();
        self.remove(&skill).await?;
        self.save(&skill).await?;
        Ok(true)
    }

    async fn save(&self, skill: &Skill) -> anyhow::Result<PathBuf> {
        let skills_dir = self.skills_dir.clone();
        let skill = skill.clone();
        tokio::task::spawn_blocking(move || save_blocking(&skills_dir, &skill))
            .await
            .map_err(|e| anyhow::anyhow!("skill save task panicked: {e}"))?
    }

    async fn remove(&self, skill: &Skill) -> anyhow::Result<()> {
        let skills_dir = self.skills_dir.clone();
        let skill = skill.clone();
        tokio::task::spawn_blocking(move || remove_blocking(&skills_dir, &skill))
            .await
            .map_err(|e| anyhow::anyhow!("skill remove task panicked: {e}"))?
    }

    async fn load_status_dir(&self, status: SkillStatus) -> anyhow::Result<Vec<Skill>> {
        let dir = self.skills_dir.join(status.dir_name());
        tokio::task::spawn_blocking(move || load_dir_blocking(&dir))
            .await
            .map_err(|e| anyhow::anyhow!("skill load task panicked: {e}"))?
    }
}

fn save_blocking(skills_dir: &Path, skill: &Skill) -> anyhow::Result<PathBuf> {
    let status_dir = skills_dir.join(skill.status.dir_name());
    if skill.is_directory {
        let dir = status_dir.join(&skill.id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("skill.md"), to_markdown(skill)?)?;
        if let Some(readme) = &skill.readme {
            std::fs::write(dir.join("README.md"), readme)?;
        }
        if let Some(reference) = &skill.reference {
            std::fs::write(dir.join("reference.md"), reference)?;
        }
        Ok(dir)
    } else {
        std::fs::create_dir_all(&status_dir)?;
        let path = status_dir.join(format!("{}.md", skill.id));
        std::fs::write(&path, to_markdown(skill)?)?;
        Ok(path)
    }
}

fn remove_blocking(skills_dir: &Path, skill: &Skill) -> anyhow::Result<()> {
    let status_dir = skills_dir.join(skill.status.dir_name());
    if skill.is_directory {
        let dir = status_dir.join(&skill.id);
        if dir.is_dir() {
            std::fs::remove_dir_all(dir)?;
        }
    } else {
        let path = status_dir.join(format!("{}.md", skill.id));
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn load_dir_blocking(dir: &Path) -> anyhow::Result<Vec<Skill>> {
    let mut skills = Vec::new();
    if !dir.is_dir() {
        return Ok(skills);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let skill_md = path.join("skill.md");
            if !skill_md.is_file() {
                continue;
            }
            match load_file(&skill_md) {
                Ok(mut skill) => {
                    skill.readme = std::fs::read_to_string(path.join("README.md")).ok();
                    skill.reference = std::fs::read_to_string(path.join("reference.md")).ok();
                    skills.push(skill);
                }
                Err(e) => warn!(path = %skill_md.display(), error = %e, "skipping unparsable skill"),
            }
        } else if path.extension().is_some_and(|ext| ext == "md") {
            match load_file(&path) {
                Ok(skill) => skills.push(skill),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparsable skill"),
            }
        }
    }
    Ok(skills)
}

fn load_file(path: &Path) -> anyhow::Result<Skill> {
    let text = std::fs::read_to_string(path)?;
    from_markdown(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::SkillExample;

    fn sample(id: &str, triggers: Vec<&str>) -> Skill {
        Skill {
            id: id.to_string(),
            name: "Check Weather".into(),
            tool: "web_search".into(),
            triggers: triggers.into_iter().map(String::from).collect(),
            examples: vec![SkillExample {
                user: "what's the weather".into(),
                tool_call: serde_json::json!({"name": "web_search"}),
            }],
            instructions: "Use web_search for weather.".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            source: "agent".into(),
            status: SkillStatus::Pending,
            success_count: 0,
            failure_count: 0,
            is_directory: false,
            readme: None,
            reference: None,
        }
    }

    #[tokio::test]
    async fn learned_skill_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        manager.add_learned_skill(sample("s1", vec!["weather"])).await.unwrap();

        let all = manager.all_skills().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "s1");
        assert_eq!(all[0].status, SkillStatus::Approved);
    }

    #[tokio::test]
    async fn pending_skill_is_not_in_all_skills() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        manager.add_pending_skill(sample("s1", vec!["weather"])).await.unwrap();

        assert!(manager.all_skills().await.unwrap().is_empty());
        assert_eq!(manager.pending_skills().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_moves_skill_from_pending_to_learned() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        manager.add_pending_skill(sample("s1", vec!["weather"])).await.unwrap();

        manager.approve_skill("s1").await.unwrap();

        assert!(manager.pending_skills().await.unwrap().is_empty());
        assert_eq!(manager.all_skills().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_matching_skills_filters_by_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        manager.add_learned_skill(sample("s1", vec!["weather"])).await.unwrap();
        manager.add_learned_skill(sample("s2", vec!["email"])).await.unwrap();

        let matches = manager.find_matching_skills("what's the weather today").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "s1");
    }

    #[tokio::test]
    async fn update_skill_adds_trigger_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        manager.add_learned_skill(sample("s1", vec!["weather"])).await.unwrap();

        manager.update_skill("s1", Some("weather"), None).await.unwrap();
        manager.update_skill("s1", Some("forecast"), None).await.unwrap();

        let skill = manager.get_skill("s1").await.unwrap().unwrap();
        assert_eq!(skill.triggers, vec!["weather".to_string(), "forecast".to_string()]);
    }

    #[tokio::test]
    async fn directory_skill_persists_readme_and_reference() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        let mut skill = sample("complex1", vec!["stock price"]);
        skill.is_directory = true;
        skill.readme = Some("# Limitation\nNo live stock data.".into());
        skill.reference = Some("# Reference\nUse web_search instead.".into());

        manager.add_learned_skill(skill).await.unwrap();

        let loaded = manager.get_skill("complex1").await.unwrap().unwrap();
        assert!(loaded.is_directory);
        assert!(loaded.readme.unwrap().contains("Limitation"));
        assert!(loaded.reference.unwrap().contains("Reference"));
    }

    #[tokio::test]
    async fn prompt_section_is_none_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SkillsManager::new(dir.path());
        assert!(manager.prompt_section("hello").await.unwrap().is_none());
    }
}
