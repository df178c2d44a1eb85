// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistent heartbeat that fires scheduled prompts back through the agent.
//!
//! The scheduler never calls into the agent orchestrator directly — it only
//! knows [`PromptRunner`], a narrow seam the orchestrator implements. That
//! keeps this crate free of a dependency on `pigeon-core` and makes the
//! heartbeat loop trivially testable with a stub runner.

pub mod grammar;

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use pigeon_store::{ExecutionRecord, ScheduledTask, Store};
use tracing::{error, info, warn};

pub use grammar::{next_occurrence, parse_schedule, ScheduleError, ScheduleKind};

/// Executes a scheduled prompt through the agentic loop and returns its
/// final reply text. Implemented by the agent orchestrator; this crate never
/// sees a concrete agent type.
#[async_trait]
pub trait PromptRunner: Send + Sync {
    async fn run_prompt(&self, user_id: &str, platform: &str, prompt: &str) -> anyhow::Result<String>;
}

type CompletionHandler = Box<dyn Fn(&ScheduledTask, &ExecutionRecord) + Send + Sync>;

pub struct Scheduler {
    store: Store,
    runner: Arc<dyn PromptRunner>,
    heartbeat_interval: StdDuration,
    overdue_grace: chrono::Duration,
    on_complete: Mutex<Vec<CompletionHandler>>,
    running: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        runner: Arc<dyn PromptRunner>,
        heartbeat_interval: StdDuration,
        overdue_grace_seconds: i64,
    ) -> Self {
        Self {
            store,
            runner,
            heartbeat_interval,
            overdue_grace: chrono::Duration::seconds(overdue_grace_seconds),
            on_complete: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// Register a callback fired after each task execution, successful or
    /// not. This is the only seam through which a run's result reaches the
    /// outside world — the scheduler itself never touches the notification
    /// bus, so the agent wires a handler here that composes and delivers
    /// (or queues) the completion message. A panicking or misbehaving
    /// handler never aborts the heartbeat: handlers run synchronously but
    /// their errors (if any escape as a `Result` inside the closure) are the
    /// caller's concern, not the loop's.
    pub fn register_completion_handler<F>(&self, handler: F)
    where
        F: Fn(&ScheduledTask, &ExecutionRecord) + Send + Sync + 'static,
    {
        self.on_complete
            .lock()
            .expect("completion handler list mutex poisoned")
            .push(Box::new(handler));
    }

    /// Parse `schedule_text`, persist the task, and read it back to confirm
    /// the write actually landed before telling the caller it succeeded.
    pub async fn schedule(
        &self,
        user_id: &str,
        platform: &str,
        name: &str,
        prompt: &str,
        schedule_text: &str,
    ) -> anyhow::Result<ScheduledTask> {
        let now = Utc::now();
        let parsed = parse_schedule(schedule_text, now)?;
        let created = self
            .store
            .create_scheduled_task(
                user_id,
                platform,
                name,
                prompt,
                parsed.kind.as_str(),
                &parsed.schedule_data.to_string(),
                parsed.next_run,
            )
            .await?;

        let confirmed = self
            .store
            .get_scheduled_task(&created.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("scheduled task {} did not persist", created.id))?;
        Ok(confirmed)
    }

    pub async fn cancel(&self, task_id: &str) -> anyhow::Result<()> {
        self.store.delete_scheduled_task(task_id).await
    }

    pub async fn pause(&self, task_id: &str) -> anyhow::Result<()> {
        self.store.set_task_enabled(task_id, false).await
    }

    pub async fn resume(&self, task_id: &str) -> anyhow::Result<()> {
        self.store.set_task_enabled(task_id, true).await
    }

    pub async fn list(&self, user_id: &str) -> anyhow::Result<Vec<ScheduledTask>> {
        self.store.list_tasks_for_user(user_id).await
    }

    /// Run one heartbeat tick: execute every due, enabled task once, in the
    /// order they came due, and return how many ran.
    pub async fn run_heartbeat_once(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let due = self.store.due_tasks(now).await?;
        let mut ran = 0;
        for task in due {
            self.run_task(task, now).await;
            ran += 1;
        }
        Ok(ran)
    }

    async fn run_task(&self, task: ScheduledTask, now: chrono::DateTime<Utc>) {
        let overdue_by = now - chrono::DateTime::parse_from_rfc3339(&task.next_run)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        if overdue_by > self.overdue_grace {
            warn!(task_id = %task.id, name = %task.name, "skipping task, overdue past grace window");
            if let Err(e) = self.advance_schedule(&task, now).await {
                error!(task_id = %task.id, error = %e, "failed to reschedule overdue task");
            }
            return;
        }

        info!(task_id = %task.id, name = %task.name, "running scheduled task");
        let outcome = self.runner.run_prompt(&task.user_id, &task.platform, &task.prompt).await;
        let (result_text, success) = match &outcome {
            Ok(text) => (text.clone(), true),
            Err(e) => (format!("scheduled task failed: {e}"), false),
        };

        let execution = match self
            .store
            .record_execution(&task.id, &task.name, &task.user_id, &task.platform, &result_text, success, now)
            .await
        {
            Ok(e) => e,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "failed to record task execution");
                return;
            }
        };

        if let Err(e) = self.advance_schedule(&task, now).await {
            error!(task_id = %task.id, error = %e, "failed to reschedule task");
        }

        for handler in self.on_complete.lock().expect("completion handler list mutex poisoned").iter() {
            handler(&task, &execution);
        }
    }

    async fn advance_schedule(&self, task: &ScheduledTask, ran_at: chrono::DateTime<Utc>) -> anyhow::Result<()> {
        let kind = ScheduleKind::parse(&task.schedule_kind)
            .ok_or_else(|| anyhow::anyhow!("unknown schedule kind {:?}", task.schedule_kind))?;
        let data: serde_json::Value = serde_json::from_str(&task.schedule_data)?;
        let next = next_occurrence(kind, &data, ran_at)?;
        self.store.reschedule_task(&task.id, ran_at, next).await
    }

    /// Start the heartbeat on a background task at the configured interval.
    /// A single tick's failure is logged and never stops subsequent ticks.
    /// Calling `start` while already running replaces the previous task.
    pub fn start(self: &Arc<Self>) {
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.heartbeat_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.run_heartbeat_once().await {
                    error!(error = %e, "scheduler heartbeat tick failed");
                }
            }
        });
        if let Some(previous) = self.running.lock().expect("scheduler task handle mutex poisoned").replace(handle) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.running.lock().expect("scheduler task handle mutex poisoned").take() {
            handle.abort();
        }
    }
}
