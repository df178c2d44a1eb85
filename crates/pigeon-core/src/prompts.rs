// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Prompt composition: a time-stamped base system prompt, augmented
//! per-user with a memory block and a matched-skills block, plus the
//! tool list so the model knows what it can call.

use chrono::Local;
use pigeon_skills::SkillsManager;
use pigeon_store::Store;
use pigeon_tools::ToolRegistry;

const BASE_PROMPT: &str = "\
You are pigeon, a locally-hosted personal assistant. You run on behalf \
of one user at a time, remember what they tell you across sessions, and \
can act on their behalf through the tools available to you. Be direct \
and concise; use a tool when one exists for the job rather than \
guessing.";

/// Build the system prompt for one turn: base instructions, current
/// time, the user's memory block (if any), any matching skills for
/// `user_message`, and the list of tools this agent can call.
pub async fn system_prompt(
    store: &Store,
    skills: &SkillsManager,
    tools: &ToolRegistry,
    user_id: &str,
    user_message: &str,
) -> anyhow::Result<String> {
    let mut sections = vec![BASE_PROMPT.to_string()];
    sections.push(format!("Current time: {}", Local::now().format("%Y-%m-%d %H:%M:%S %Z")));

    if let Some(memory_block) = store.format_memories_for_prompt(user_id).await? {
        sections.push(memory_block);
    }

    if let Some(skills_block) = skills.prompt_section(user_message).await? {
        sections.push(skills_block);
    }

    sections.push(tool_list(tools));

    Ok(sections.join("\n\n"))
}

fn tool_list(tools: &ToolRegistry) -> String {
    let mut block = String::from("## Available Tools\n");
    for schema in tools.schemas() {
        block.push_str(&format!("- {}: {}\n", schema.name, schema.description));
    }
    block
}

/// System-role message nudging the model to make progress when a turn
/// has gone quiet for too long without a tool call.
pub fn stall_nudge() -> String {
    "You have not made progress in a while. Either call a tool to move \
     forward or answer the user directly with what you know so far."
        .to_string()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn prompt_includes_base_and_time_and_tools() {
        let store = Store::open_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let skills = SkillsManager::new(dir.path());
        let tools = ToolRegistry::new();

        let prompt = system_prompt(&store, &skills, &tools, "u1", "hello").await.unwrap();
        assert!(prompt.contains("pigeon"));
        assert!(prompt.contains("Current time:"));
        assert!(prompt.contains("Available Tools"));
    }

    #[tokio::test]
    async fn prompt_includes_memory_block_when_present() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .set_memory("u1", pigeon_store::MemoryType::Preference, "favorite_color", "blue", 1.0, "user")
            .await
            .unwrap();
        let dir = tempdir().unwrap();
        let skills = SkillsManager::new(dir.path());
        let tools = ToolRegistry::new();

        let prompt = system_prompt(&store, &skills, &tools, "u1", "hello").await.unwrap();
        assert!(prompt.contains("What I Know About You"));
        assert!(prompt.contains("blue"));
    }
}
