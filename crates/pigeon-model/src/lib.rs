// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Model-client vocabulary and a single generic OpenAI-compatible driver.
//!
//! The model runtime itself is treated as an opaque external service: this
//! crate's job is the wire protocol (messages, streaming, tool schemas) and
//! the native/fallback tool-calling dance, not a catalog of vendor drivers.

pub mod catalog;
pub mod client;
pub mod fallback;
pub mod sanitize;
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use catalog::{InputModality, ModelCatalogEntry};
pub use client::{AssistantTurn, ModelClient, ToolCallRequest};
pub use fallback::NativeToolSupport;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::{AuthStyle, OpenAiCompatProvider};
pub use provider::ModelProvider;
pub use types::*;

use pigeon_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// `cfg.provider` selects between the generic OpenAI-compatible driver (any
/// gateway or self-hosted server speaking that wire format — the default for
/// everything except the in-process mock) and `"mock"`, used in tests and
/// offline development.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    let max_tokens = cfg
        .max_tokens
        .or_else(|| catalog::lookup(&cfg.provider, &cfg.name).map(|e| e.max_output_tokens))
        .unwrap_or(4096);

    match cfg.provider.as_str() {
        "mock" => Ok(Box::new(MockProvider)),
        _ => {
            let base_url = cfg
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("model config for provider {:?} requires base_url", cfg.provider))?;
            let auth_style = if resolve_api_key(cfg).is_some() { AuthStyle::Bearer } else { AuthStyle::None };
            Ok(Box::new(OpenAiCompatProvider::new(
                cfg.name.clone(),
                resolve_api_key(cfg),
                base_url,
                max_tokens,
                cfg.temperature,
                auth_style,
            )))
        }
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    None
}
