// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The seam between the agent loop and concrete tool implementations.
//!
//! The agent never imports a tool module directly — it only knows about
//! `ToolProvider`. This keeps pluggable integrations (mail, calendar,
//! payments, web search) and the skills/memory/self-healing built-ins
//! equally external to the loop, and lets a test substitute a provider with
//! a handful of fakes instead of the real stack.

use std::sync::Arc;

use async_trait::async_trait;

use pigeon_skills::SkillsManager;
use pigeon_store::Store;

use crate::builtin::memory::{ForgetTool, ListMemoriesTool, RecallTool, RememberTool};
use crate::builtin::self_healing::{AnalyzeFailurePatternsTool, MarkFailureResolvedTool, ViewFailureLogTool};
use crate::builtin::skills::{CreateSkillTool, DocumentLimitationTool, LearnSkillTool, UpdateSkillTool, ViewSkillsTool};
use crate::tool::Tool;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn get_tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// The always-available built-ins: memory, skills, and self-healing. A
/// binary wires this alongside whatever pluggable integrations it supports
/// by composing providers, e.g. `vec![standard.get_tools(), mail.get_tools()].concat()`.
pub struct StandardToolProvider {
    store: Store,
    skills: SkillsManager,
}

impl StandardToolProvider {
    pub fn new(store: Store, skills: SkillsManager) -> Self {
        Self { store, skills }
    }
}

#[async_trait]
impl ToolProvider for StandardToolProvider {
    async fn get_tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(RememberTool::new(self.store.clone())),
            Arc::new(RecallTool::new(self.store.clone())),
            Arc::new(ListMemoriesTool::new(self.store.clone())),
            Arc::new(ForgetTool::new(self.store.clone())),
            Arc::new(ViewFailureLogTool::new(self.store.clone())),
            Arc::new(MarkFailureResolvedTool::new(self.store.clone())),
            Arc::new(AnalyzeFailurePatternsTool::new(self.store.clone())),
            Arc::new(CreateSkillTool::new(self.skills.clone())),
            Arc::new(LearnSkillTool::new(self.skills.clone())),
            Arc::new(ViewSkillsTool::new(self.skills.clone())),
            Arc::new(UpdateSkillTool::new(self.skills.clone())),
            Arc::new(DocumentLimitationTool::new(self.skills.clone())),
        ]
    }
}
