// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Scheduled task, execution-history and pending-notification tables.
//!
//! This module only persists and retrieves rows; the grammar that turns
//! "every morning" into a `schedule_kind`/`schedule_data` pair and the
//! heartbeat loop that walks due tasks both live in the scheduler crate on
//! top of this API.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::connection::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTask {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub name: String,
    pub prompt: String,
    pub schedule_kind: String,
    pub schedule_data: String,
    pub created_at: String,
    pub next_run: String,
    pub last_run: Option<String>,
    pub run_count: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub task_id: String,
    pub task_name: String,
    pub user_id: String,
    pub platform: String,
    pub result: String,
    pub success: bool,
    pub ran_at: String,
}

/// Execution results are stored truncated so a runaway tool output can't blow
/// up the history table.
const MAX_RESULT_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingNotification {
    pub id: String,
    pub task_id: Option<String>,
    pub user_id: String,
    pub platform: String,
    pub message: String,
    pub created_at: String,
    pub delivered: bool,
    pub delivered_at: Option<String>,
}

impl Store {
    pub async fn create_scheduled_task(
        &self,
        user_id: &str,
        platform: &str,
        name: &str,
        prompt: &str,
        schedule_kind: &str,
        schedule_data: &str,
        next_run: DateTime<Utc>,
    ) -> anyhow::Result<ScheduledTask> {
        let user_id = user_id.to_string();
        let platform = platform.to_string();
        let name = name.to_string();
        let prompt = prompt.to_string();
        let schedule_kind = schedule_kind.to_string();
        let schedule_data = schedule_data.to_string();
        let next_run = next_run.to_rfc3339();

        self.with_conn(move |conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO scheduled_tasks
                    (id, user_id, platform, name, prompt, schedule_kind, schedule_data, created_at, next_run, run_count, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 1)",
                params![id, user_id, platform, name, prompt, schedule_kind, schedule_data, now, next_run],
            )?;
            row_by_id(conn, &id)
        })
        .await
    }

    pub async fn get_scheduled_task(&self, id: &str) -> anyhow::Result<Option<ScheduledTask>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, platform, name, prompt, schedule_kind, schedule_data, created_at, next_run, last_run, run_count, enabled
                     FROM scheduled_tasks WHERE id = ?1",
                    params![id],
                    row_to_task,
                )
                .optional()?)
        })
        .await
    }

    /// Tasks that are enabled and due at or before `now`.
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledTask>> {
        let now = now.to_rfc3339();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, platform, name, prompt, schedule_kind, schedule_data, created_at, next_run, last_run, run_count, enabled
                 FROM scheduled_tasks WHERE enabled = 1 AND next_run <= ?1 ORDER BY next_run",
            )?;
            let rows = stmt.query_map(params![now], row_to_task)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_tasks_for_user(&self, user_id: &str) -> anyhow::Result<Vec<ScheduledTask>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, platform, name, prompt, schedule_kind, schedule_data, created_at, next_run, last_run, run_count, enabled
                 FROM scheduled_tasks WHERE user_id = ?1 ORDER BY next_run",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_task)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Advance a task after it runs: bump `run_count`, set `last_run`, and
    /// either reschedule to `next_run` or disable it (`next_run = None` for
    /// one-shot tasks).
    pub async fn reschedule_task(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let id = id.to_string();
        let ran_at = ran_at.to_rfc3339();
        let next_run = next_run.map(|t| t.to_rfc3339());
        self.with_conn(move |conn| {
            match next_run {
                Some(next) => conn.execute(
                    "UPDATE scheduled_tasks SET last_run = ?1, next_run = ?2, run_count = run_count + 1 WHERE id = ?3",
                    params![ran_at, next, id],
                )?,
                None => conn.execute(
                    "UPDATE scheduled_tasks SET last_run = ?1, run_count = run_count + 1, enabled = 0 WHERE id = ?2",
                    params![ran_at, id],
                )?,
            };
            Ok(())
        })
        .await
    }

    pub async fn set_task_enabled(&self, id: &str, enabled: bool) -> anyhow::Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE scheduled_tasks SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_scheduled_task(&self, id: &str) -> anyhow::Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    pub async fn record_execution(
        &self,
        task_id: &str,
        task_name: &str,
        user_id: &str,
        platform: &str,
        result: &str,
        success: bool,
        ran_at: DateTime<Utc>,
    ) -> anyhow::Result<ExecutionRecord> {
        let task_id = task_id.to_string();
        let task_name = task_name.to_string();
        let user_id = user_id.to_string();
        let platform = platform.to_string();
        let result = if result.chars().count() > MAX_RESULT_LEN {
            result.chars().take(MAX_RESULT_LEN).collect()
        } else {
            result.to_string()
        };
        let ran_at = ran_at.to_rfc3339();

        self.with_conn(move |conn| {
            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO scheduled_executions (id, task_id, task_name, user_id, platform, result, success, ran_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![id, task_id, task_name, user_id, platform, result, success, ran_at],
            )?;
            Ok(ExecutionRecord {
                id,
                task_id,
                task_name,
                user_id,
                platform,
                result,
                success,
                ran_at,
            })
        })
        .await
    }

    pub async fn execution_history(&self, task_id: &str, limit: usize) -> anyhow::Result<Vec<ExecutionRecord>> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, task_name, user_id, platform, result, success, ran_at
                 FROM scheduled_executions WHERE task_id = ?1 ORDER BY ran_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![task_id, limit as i64], row_to_execution)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn enqueue_notification(
        &self,
        task_id: Option<&str>,
        user_id: &str,
        platform: &str,
        message: &str,
    ) -> anyhow::Result<PendingNotification> {
        let task_id = task_id.map(str::to_string);
        let user_id = user_id.to_string();
        let platform = platform.to_string();
        let message = message.to_string();

        self.with_conn(move |conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO scheduled_notifications (id, task_id, user_id, platform, message, created_at, delivered)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![id, task_id, user_id, platform, message, now],
            )?;
            Ok(PendingNotification {
                id,
                task_id,
                user_id,
                platform,
                message,
                created_at: now,
                delivered: false,
                delivered_at: None,
            })
        })
        .await
    }

    /// Undelivered notifications for a platform, oldest first — used when a
    /// channel adapter (re)registers so queued notifications are not lost.
    pub async fn pending_notifications(&self, platform: &str) -> anyhow::Result<Vec<PendingNotification>> {
        let platform = platform.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, user_id, platform, message, created_at, delivered, delivered_at
                 FROM scheduled_notifications WHERE platform = ?1 AND delivered = 0 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map(params![platform], row_to_notification)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn mark_notification_delivered(&self, id: &str) -> anyhow::Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE scheduled_notifications SET delivered = 1, delivered_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
    }
}

fn row_by_id(conn: &rusqlite::Connection, id: &str) -> anyhow::Result<ScheduledTask> {
    Ok(conn.query_row(
        "SELECT id, user_id, platform, name, prompt, schedule_kind, schedule_data, created_at, next_run, last_run, run_count, enabled
         FROM scheduled_tasks WHERE id = ?1",
        params![id],
        row_to_task,
    )?)
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ScheduledTask> {
    Ok(ScheduledTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        platform: row.get(2)?,
        name: row.get(3)?,
        prompt: row.get(4)?,
        schedule_kind: row.get(5)?,
        schedule_data: row.get(6)?,
        created_at: row.get(7)?,
        next_run: row.get(8)?,
        last_run: row.get(9)?,
        run_count: row.get(10)?,
        enabled: row.get::<_, i64>(11)? != 0,
    })
}

fn row_to_execution(row: &rusqlite::Row) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        user_id: row.get(3)?,
        platform: row.get(4)?,
        result: row.get(5)?,
        success: row.get::<_, i64>(6)? != 0,
        ran_at: row.get(7)?,
    })
}

fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<PendingNotification> {
    Ok(PendingNotification {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        platform: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
        delivered: row.get::<_, i64>(6)? != 0,
        delivered_at: row.get(7)?,
    })
}
