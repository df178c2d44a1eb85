// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Small static catalog of known models, used only to resolve context-window
//! size and vision support for the "vision handoff" behaviour in the agent
//! loop. The model runtime itself is an opaque external service; this catalog
//! exists purely so the agent can pick a vision-capable fallback model.

use serde::{Deserialize, Serialize};

/// Input modalities supported by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Text,
    Image,
}

/// Metadata for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    pub id: String,
    pub provider: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub input_modalities: Vec<InputModality>,
}

impl ModelCatalogEntry {
    pub fn supports_images(&self) -> bool {
        self.input_modalities.contains(&InputModality::Image)
    }
}

fn entry(id: &str, provider: &str, context_window: u32, max_output_tokens: u32, vision: bool) -> ModelCatalogEntry {
    let mut modalities = vec![InputModality::Text];
    if vision {
        modalities.push(InputModality::Image);
    }
    ModelCatalogEntry {
        id: id.into(),
        provider: provider.into(),
        context_window,
        max_output_tokens,
        input_modalities: modalities,
    }
}

/// All entries known to the bundled catalog.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        entry("gpt-4o", "openai", 128_000, 16_384, true),
        entry("gpt-4o-mini", "openai", 128_000, 16_384, true),
        entry("claude-opus-4-6", "anthropic", 200_000, 8_192, true),
        entry("claude-sonnet-4-6", "anthropic", 200_000, 8_192, true),
        entry("mock-model", "mock", 32_000, 4_096, true),
        entry("scripted-mock-model", "mock", 32_000, 4_096, true),
    ]
}

/// Look up a single model by id. Providers are matched loosely (a model
/// reached through a gateway or an OpenAI-compatible relay still carries its
/// original catalog id), so lookup keys on `model_id` alone.
pub fn lookup(_provider: &str, model_id: &str) -> Option<ModelCatalogEntry> {
    static_catalog().into_iter().find(|e| e.id == model_id)
}

/// First catalog entry (by any provider) that declares vision support.
/// Used by the agent's vision handoff to pick a fallback model.
pub fn first_vision_capable() -> Option<ModelCatalogEntry> {
    static_catalog().into_iter().find(|e| e.supports_images())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
