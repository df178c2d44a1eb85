// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level configuration, assembled by [`crate::loader::load`] from a
/// layered merge of defaults, config file, and environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named provider configurations, selectable by key instead of the
    /// default `model` block.
    ///
    /// ```yaml
    /// providers:
    ///   work_vllm:
    ///     provider: openai-compat
    ///     base_url: http://localhost:8000/v1
    ///     name: llama-3.3-70b
    /// ```
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ModelConfig>,
}

/// Model provider connection details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `"openai-compat"` for any server speaking the OpenAI chat-completions
    /// wire format, or `"mock"` for the in-process deterministic provider.
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key, read at startup.
    pub api_key_env: Option<String>,
    /// Explicit API key. Prefer `api_key_env` in committed config files.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions endpoint (required for
    /// `openai-compat`; self-hosted servers rarely share one default).
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion. Falls back to the
    /// static catalog's `max_output_tokens` when unset.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0-2.0).
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compat".into(),
            name: "gpt-4o".into(),
            api_key_env: Some("PIGEON_API_KEY".into()),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: 0.7,
        }
    }
}

/// Agentic-loop tuning: iteration bounds and the approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard ceiling on model-call/tool-dispatch rounds within one turn
    /// before the loop gives up and returns a fallback summary.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Require human approval before executing a tool unless the tool's own
    /// descriptor says otherwise.
    #[serde(default = "default_true")]
    pub require_approval_by_default: bool,
    /// Seconds to wait for an approval decision before treating it as denied.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_seconds: u64,
    /// Seconds of no tool activity within a turn before the loop nudges the
    /// model to make progress instead of stalling silently.
    #[serde(default = "default_stall_nudge_seconds")]
    pub stall_nudge_after_seconds: u64,
}

fn default_max_tool_rounds() -> u32 {
    12
}

fn default_approval_timeout() -> u64 {
    300
}

fn default_stall_nudge_seconds() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            require_approval_by_default: true,
            approval_timeout_seconds: default_approval_timeout(),
            stall_nudge_after_seconds: default_stall_nudge_seconds(),
        }
    }
}

/// Location of the embedded SQLite database backing conversations, messages,
/// memories, failures, and scheduled tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: "~/.pigeon/pigeon.db".into() }
    }
}

/// Scheduler heartbeat tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between heartbeat ticks that scan for due scheduled tasks.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// How far in the past a task's `next_run` may fall and still be treated
    /// as due rather than skipped as stale, on restart after downtime.
    #[serde(default = "default_overdue_grace")]
    pub overdue_grace_seconds: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_overdue_grace() -> u64 {
    86_400
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            overdue_grace_seconds: default_overdue_grace(),
        }
    }
}

/// Location of learned-skill markdown files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    pub skills_dir: String,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self { skills_dir: "~/.pigeon/skills".into() }
    }
}

/// Structured-logging verbosity, passed straight to `tracing_subscriber`'s
/// `EnvFilter` when `PIGEON_LOG` is not set in the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_sane_agent_bounds() {
        let c = Config::default();
        assert_eq!(c.agent.max_tool_rounds, 12);
        assert!(c.agent.require_approval_by_default);
    }

    #[test]
    fn model_config_default_provider_is_openai_compat() {
        assert_eq!(ModelConfig::default().provider, "openai-compat");
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let c = Config::default();
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.name, c.model.name);
        assert_eq!(back.scheduler.heartbeat_interval_seconds, c.scheduler.heartbeat_interval_seconds);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "model:\n  provider: mock\n  name: mock-model\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.model.provider, "mock");
        assert_eq!(c.agent.max_tool_rounds, 12, "unset sections must fall back to defaults");
    }
}
