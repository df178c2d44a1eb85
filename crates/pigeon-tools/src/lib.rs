// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
pub mod provider;
pub mod registry;
pub mod tool;

pub use provider::{StandardToolProvider, ToolProvider};
pub use registry::{RegistryError, ToolRegistry};
pub use tool::{schema_of, Tool, ToolSchema};

pub use builtin::{
    AnalyzeFailurePatternsTool, CreateSkillTool, DocumentLimitationTool, ForgetTool, LearnSkillTool,
    ListMemoriesTool, MarkFailureResolvedTool, RecallTool, RememberTool, UpdateSkillTool, ViewFailureLogTool,
    ViewSkillsTool,
};
