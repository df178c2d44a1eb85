// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent must reach every tool only through `pigeon_tools`'s
//! `ToolProvider`/`ToolRegistry`/`Tool` seam, never by importing a
//! concrete built-in tool module directly. This is a property of the
//! source text, not something a unit test inside `agent.rs` can check
//! from its own vantage point, hence a standalone integration test.

use std::fs;
use std::path::Path;

#[test]
fn agent_source_never_imports_a_concrete_tool_module() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/agent.rs");
    let source = fs::read_to_string(&path).expect("read src/agent.rs");

    assert!(
        !source.contains("pigeon_tools::builtin"),
        "agent.rs must depend only on ToolProvider/ToolRegistry/Tool, not a concrete builtin module"
    );
    assert!(
        !source.contains("builtin::"),
        "agent.rs must not reference any builtin:: tool implementation directly"
    );
}
