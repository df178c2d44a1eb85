// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent orchestrator: the bounded model-call/tool-dispatch cycle,
//! the approval rendezvous, and the wiring between the model client,
//! the durable store, the tool registry, and the notification bus.
//!
//! This file must never import a concrete tool module — only the
//! `pigeon_tools` abstractions (`ToolProvider`, `ToolRegistry`, `Tool`).
//! A dependency-injection guard (`tests/di_guard.rs`) enforces this.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use pigeon_channels::{ApprovalGateway, NotificationBus, PendingApproval};
use pigeon_config::{AgentConfig, Config, ModelConfig};
use pigeon_model::{ContentPart, FunctionCall, Message as ModelMessage, ModelClient};
use pigeon_scheduler::PromptRunner;
use pigeon_skills::SkillsManager;
use pigeon_store::{Message as StoredMessage, Role as StoredRole, Store};
use pigeon_tools::{ToolProvider, ToolRegistry};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::prompts::{self, system_prompt};

/// Tool-result text is stored (and fed to the model within the same
/// turn) in full, but truncated to this length before being written
/// to the conversation's audit trail.
const TOOL_RESULT_AUDIT_LEN: usize = 10_000;
/// How many of the most recent messages are replayed into the model on
/// each `chat` call.
const HISTORY_WINDOW: usize = 40;

pub struct Agent {
    model: RwLock<ModelClient>,
    vision_model: Option<ModelClient>,
    providers: HashMap<String, ModelConfig>,
    tools: Arc<ToolRegistry>,
    store: Store,
    skills: SkillsManager,
    channels: Arc<NotificationBus>,
    approval_gateway: Arc<ApprovalGateway>,
    config: AgentConfig,
}

impl Agent {
    pub async fn new(
        cfg: &Config,
        tool_provider: &dyn ToolProvider,
        store: Store,
        skills: SkillsManager,
        channels: Arc<NotificationBus>,
    ) -> anyhow::Result<Self> {
        let model = ModelClient::new(pigeon_model::from_config(&cfg.model)?);
        let vision_model = match cfg.providers.get("vision") {
            Some(vision_cfg) => Some(ModelClient::new(pigeon_model::from_config(vision_cfg)?)),
            None => None,
        };

        let mut providers = cfg.providers.clone();
        providers.entry("default".to_string()).or_insert_with(|| cfg.model.clone());

        let mut registry = ToolRegistry::new();
        for tool in tool_provider.get_tools().await {
            registry.register_arc(tool)?;
        }

        Ok(Self {
            model: RwLock::new(model),
            vision_model,
            providers,
            tools: Arc::new(registry),
            store,
            skills,
            approval_gateway: Arc::new(ApprovalGateway::new(channels.clone())),
            channels,
            config: cfg.agent.clone(),
        })
    }

    /// The shared approval gateway platforms without a richer native UI
    /// can register as their `ApprovalHandler` (see `approve_pending`).
    pub fn approval_gateway(&self) -> Arc<ApprovalGateway> {
        self.approval_gateway.clone()
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        self.tools.clone()
    }

    /// Swap the active model by provider name, looked up in the
    /// `providers` map built from config (plus `"default"`, the model
    /// configured at startup).
    pub async fn set_model(&self, name: &str) -> anyhow::Result<()> {
        let cfg = self.providers.get(name).ok_or_else(|| anyhow::anyhow!("unknown model provider: {name}"))?;
        let provider = pigeon_model::from_config(cfg)?;
        *self.model.write().await = ModelClient::new(provider);
        Ok(())
    }

    pub async fn clear_history(&self, user_id: &str, session_id: Option<&str>) -> anyhow::Result<()> {
        self.store.clear_messages_for_user(user_id, session_id).await
    }

    pub fn register_approval_handler(&self, platform: &str, handler: Arc<dyn pigeon_channels::ApprovalHandler>) {
        self.channels.register_approval_handler(platform, handler);
    }

    pub async fn register_message_handler(
        &self,
        platform: &str,
        sender: Arc<dyn pigeon_channels::OutboundSender>,
    ) -> anyhow::Result<()> {
        self.channels.register_sender(platform, sender).await
    }

    pub fn approve_pending(&self, id: &str) {
        self.approval_gateway.approve(id);
    }

    pub fn deny_pending(&self, id: &str) {
        self.approval_gateway.deny(id);
    }

    /// Run one full `chat` turn: load history, compose the prompt, run
    /// the agentic loop, persist and return the final text. `on_chunk`,
    /// if supplied, receives streamed text from the first model turn
    /// and status lines emitted during tool dispatch.
    pub async fn chat(
        &self,
        user_message: &str,
        user_id: &str,
        session_id: Option<&str>,
        platform: &str,
        images: &[String],
        mut on_chunk: Option<&mut dyn FnMut(&str)>,
    ) -> anyhow::Result<String> {
        let conversation = self.store.get_or_create_conversation(user_id, session_id, platform).await?;

        // The store only ever keeps plain text: image parts are not
        // replayed from history on subsequent turns, only spliced into
        // this turn's outgoing message below.
        self.store.append_message(&conversation.id, StoredRole::User, user_message).await?;

        let system = system_prompt(&self.store, &self.skills, &self.tools, user_id, user_message).await?;
        let history = self.store.recent_messages(&conversation.id, HISTORY_WINDOW).await?;

        let mut messages = vec![ModelMessage::system(system)];
        messages.extend(history.iter().map(to_model_message));

        if !images.is_empty() {
            if let Some(last) = messages.last_mut() {
                let mut parts = vec![ContentPart::Text { text: user_message.to_string() }];
                parts.extend(images.iter().map(|url| ContentPart::image(url.clone())));
                *last = ModelMessage::user_with_parts(parts);
            }
        }

        let model_guard = self.model.read().await;
        let use_vision = !images.is_empty() && !model_guard.provider().supports_images();
        if use_vision {
            if let Some(chunk_fn) = on_chunk.as_deref_mut() {
                chunk_fn("switching to a vision-capable model for this request...\n");
            }
        }
        let active_model: &ModelClient = if use_vision {
            self.vision_model.as_ref().unwrap_or(&model_guard)
        } else {
            &model_guard
        };

        let result =
            self.run_loop(active_model, &conversation.id, messages, user_id, platform, on_chunk.as_deref_mut()).await;
        drop(model_guard);
        result
    }

    async fn run_loop(
        &self,
        model: &ModelClient,
        conversation_id: &str,
        mut messages: Vec<ModelMessage>,
        user_id: &str,
        platform: &str,
        mut on_chunk: Option<&mut dyn FnMut(&str)>,
    ) -> anyhow::Result<String> {
        let schemas = self.tools.schemas();
        let start = Instant::now();
        let stall_after = Duration::from_secs(self.config.stall_nudge_after_seconds);
        let mut nudged = false;
        let mut ran: Vec<(String, bool)> = Vec::new();

        for iteration in 0..self.config.max_tool_rounds {
            if !nudged && start.elapsed() >= stall_after {
                messages.push(ModelMessage::system(prompts::stall_nudge()));
                nudged = true;
            }

            let turn = if iteration == 0 {
                match on_chunk.as_deref_mut() {
                    Some(chunk_fn) => model.chat_stream(messages.clone(), &schemas, chunk_fn).await?,
                    None => model.chat(messages.clone(), &schemas).await?,
                }
            } else {
                model.chat(messages.clone(), &schemas).await?
            };

            if turn.tool_calls.is_empty() {
                self.store.append_message(conversation_id, StoredRole::Assistant, &turn.text).await?;
                return Ok(turn.text);
            }

            let tool_calls_json: Value = serde_json::to_value(
                turn.tool_calls
                    .iter()
                    .map(|c| serde_json::json!({"id": c.id, "name": c.name, "arguments": c.arguments}))
                    .collect::<Vec<_>>(),
            )?;
            self.store.append_tool_call_message(conversation_id, &turn.text, tool_calls_json).await?;
            for call in &turn.tool_calls {
                messages.push(ModelMessage::tool_call(
                    call.id.clone(),
                    FunctionCall { name: call.name.clone(), arguments: call.arguments.to_string() },
                ));
            }

            for call in &turn.tool_calls {
                if let Some(chunk_fn) = on_chunk.as_deref_mut() {
                    chunk_fn(&format!("using {}...\n", call.name));
                }

                if self.config.require_approval_by_default {
                    let approved = self
                        .open_approval(user_id, platform, &call.name, "checkpoint approval", None)
                        .await;
                    if !approved {
                        self.append_tool_result(conversation_id, &mut messages, call, "skipped by user").await?;
                        continue;
                    }
                }

                let Some(tool) = self.tools.get(&call.name) else {
                    self.append_tool_result(
                        conversation_id,
                        &mut messages,
                        call,
                        &format!("Error: unknown tool '{}'", call.name),
                    )
                    .await?;
                    continue;
                };

                if tool.requires_approval(&call.arguments) {
                    let amount = tool.approval_amount(&call.arguments);
                    let description = format!("{} with arguments {}", call.name, call.arguments);
                    let approved = self.open_approval(user_id, platform, &call.name, &description, amount).await;
                    if !approved {
                        self.append_tool_result(conversation_id, &mut messages, call, "User denied the request.")
                            .await?;
                        continue;
                    }
                }

                let outcome = self.tools.execute(&call.name, user_id, &call.arguments).await;
                let result_text = match outcome {
                    Ok(Ok(text)) => {
                        ran.push((call.name.clone(), true));
                        text
                    }
                    Ok(Err(e)) => {
                        self.record_tool_failure(&call.name, &e, &call.arguments, user_id, platform).await;
                        ran.push((call.name.clone(), false));
                        format!("Error executing tool: {e}")
                    }
                    Err(e) => {
                        ran.push((call.name.clone(), false));
                        format!("Error: {e}")
                    }
                };
                self.append_tool_result(conversation_id, &mut messages, call, &result_text).await?;
            }
        }

        Ok(synthesize_summary(&ran))
    }

    async fn append_tool_result(
        &self,
        conversation_id: &str,
        messages: &mut Vec<ModelMessage>,
        call: &pigeon_model::ToolCallRequest,
        text: &str,
    ) -> anyhow::Result<()> {
        let truncated: String = text.chars().take(TOOL_RESULT_AUDIT_LEN).collect();
        self.store.append_tool_result(conversation_id, &call.id, &call.name, &truncated).await?;
        messages.push(ModelMessage::tool_result(call.id.clone(), text.to_string()));
        Ok(())
    }

    async fn record_tool_failure(&self, tool_name: &str, error: &anyhow::Error, args: &Value, user_id: &str, platform: &str) {
        if let Err(e) = self
            .store
            .record_failure(tool_name, "ToolFault", &error.to_string(), Some(&args.to_string()), user_id, platform)
            .await
        {
            warn!(tool = tool_name, error = %e, "failed to record tool failure");
        }
    }

    async fn open_approval(
        &self,
        user_id: &str,
        platform: &str,
        tool_name: &str,
        description: &str,
        amount: Option<f64>,
    ) -> bool {
        let pending = PendingApproval {
            id: pigeon_channels::new_approval_id(),
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            tool_name: tool_name.to_string(),
            description: description.to_string(),
            amount,
        };
        let timeout = Duration::from_secs(self.config.approval_timeout_seconds);
        self.channels.resolve_approval(&pending, timeout).await
    }
}

fn synthesize_summary(ran: &[(String, bool)]) -> String {
    if ran.is_empty() {
        return "Reached the iteration limit without taking any action.".to_string();
    }
    let lines: Vec<String> =
        ran.iter().map(|(name, ok)| format!("- {name}: {}", if *ok { "succeeded" } else { "failed" })).collect();
    format!("Reached the iteration limit without a final answer. Tools run:\n{}", lines.join("\n"))
}

fn to_model_message(m: &StoredMessage) -> ModelMessage {
    match m.role {
        StoredRole::User => ModelMessage::user(m.content.clone()),
        StoredRole::System => ModelMessage::system(m.content.clone()),
        StoredRole::Tool => {
            let id = m.tool_call_id.clone().unwrap_or_default();
            ModelMessage::tool_result(id, m.content.clone())
        }
        StoredRole::Assistant => match &m.tool_calls {
            Some(value) => {
                let calls: Vec<Value> = serde_json::from_value(value.clone()).unwrap_or_default();
                match calls.first() {
                    Some(call) => {
                        let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                        let name = call.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                        let arguments = call.get("arguments").cloned().unwrap_or(Value::Null).to_string();
                        ModelMessage::tool_call(id, FunctionCall { name, arguments })
                    }
                    None => ModelMessage::assistant(m.content.clone()),
                }
            }
            None => ModelMessage::assistant(m.content.clone()),
        },
    }
}

#[async_trait]
impl PromptRunner for Agent {
    async fn run_prompt(&self, user_id: &str, platform: &str, prompt: &str) -> anyhow::Result<String> {
        self.chat(prompt, user_id, None, platform, &[], None).await
    }
}

/// Wires a `Scheduler`'s completion callback to the notification bus, the
/// only seam scheduled-task results reach the outside world through (see
/// `pigeon_scheduler::Scheduler::register_completion_handler`).
pub fn notify_on_completion(
    channels: Arc<NotificationBus>,
) -> impl Fn(&pigeon_store::ScheduledTask, &pigeon_store::ExecutionRecord) + Send + Sync + 'static {
    move |task, execution| {
        let channels = channels.clone();
        let task_id = task.id.clone();
        let task_name = task.name.clone();
        let user_id = task.user_id.clone();
        let platform = task.platform.clone();
        let result_text = execution.result.clone();
        let ran_at = chrono::DateTime::parse_from_rfc3339(&execution.ran_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        tokio::spawn(async move {
            if let Err(e) =
                channels.notify_task_complete(Some(&task_id), &task_name, &user_id, &platform, &result_text, ran_at).await
            {
                warn!(task_id = %task_id, error = %e, "failed to deliver task-completion notification");
            }
            info!(task_id = %task_id, "task-completion notification handled");
        });
    }
}
