// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Built-in tools backed directly by this workspace's own stores, as
//! opposed to pluggable external-integration tools (mail, calendar,
//! payments, web search) which live outside this crate and are wired in by
//! whatever `ToolProvider` the binary constructs.

pub mod memory;
pub mod self_healing;
pub mod skills;

pub use memory::{ForgetTool, ListMemoriesTool, RecallTool, RememberTool};
pub use self_healing::{AnalyzeFailurePatternsTool, MarkFailureResolvedTool, ViewFailureLogTool};
pub use skills::{CreateSkillTool, DocumentLimitationTool, LearnSkillTool, UpdateSkillTool, ViewSkillsTool};
