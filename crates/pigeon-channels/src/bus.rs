// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Outbound notification bus: one sender per platform, with a durable
//! fallback queue for platforms that have no adapter connected yet (or
//! whose adapter is momentarily down).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use pigeon_store::Store;

#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, user_id: &str, message: &str) -> anyhow::Result<()>;
}

/// Registered senders are mutated only when a platform adapter starts up
/// or shuts down; steady-state access is read-only, so a plain `RwLock`
/// over a replace-published map is sufficient.
pub struct NotificationBus {
    store: Store,
    senders: RwLock<HashMap<String, Arc<dyn OutboundSender>>>,
    approval_handlers: RwLock<HashMap<String, Arc<dyn crate::ApprovalHandler>>>,
}

impl NotificationBus {
    pub fn new(store: Store) -> Self {
        Self { store, senders: RwLock::new(HashMap::new()), approval_handlers: RwLock::new(HashMap::new()) }
    }

    /// Register an outbound sender for `platform`, then drain and deliver
    /// any pending notifications queued for it while no sender existed.
    /// Drains are idempotent: a redelivery failure just leaves the record
    /// queued for the next registration or drain.
    pub async fn register_sender(&self, platform: &str, sender: Arc<dyn OutboundSender>) -> anyhow::Result<()> {
        {
            let mut senders = self.senders.write().expect("senders lock poisoned");
            senders.insert(platform.to_string(), sender);
        }
        self.drain_pending(platform).await
    }

    pub fn register_approval_handler(&self, platform: &str, handler: Arc<dyn crate::ApprovalHandler>) {
        let mut handlers = self.approval_handlers.write().expect("approval handlers lock poisoned");
        handlers.insert(platform.to_string(), handler);
    }

    pub fn approval_handler(&self, platform: &str) -> Option<Arc<dyn crate::ApprovalHandler>> {
        self.approval_handlers.read().expect("approval handlers lock poisoned").get(platform).cloned()
    }

    pub async fn resolve_approval(
        &self,
        pending: &crate::PendingApproval,
        timeout: std::time::Duration,
    ) -> bool {
        let handler = self.approval_handler(&pending.platform);
        crate::approval::resolve(handler.as_deref(), pending, timeout).await
    }

    /// Deliver an arbitrary message outside the task-completion format,
    /// e.g. an approval prompt. Falls back to the durable queue like any
    /// other notification.
    pub async fn send_raw(&self, platform: &str, user_id: &str, message: &str) -> anyhow::Result<()> {
        self.deliver_or_queue(None, user_id, platform, message).await
    }

    fn sender_for(&self, platform: &str) -> Option<Arc<dyn OutboundSender>> {
        self.senders.read().expect("senders lock poisoned").get(platform).cloned()
    }

    /// Compose and deliver a scheduler-completion notification. Never
    /// returns an error to the caller: delivery failures and missing
    /// senders both fall back to the durable pending-notification queue.
    pub async fn notify_task_complete(
        &self,
        task_id: Option<&str>,
        task_name: &str,
        user_id: &str,
        platform: &str,
        result_text: &str,
        ran_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let message = format_notification(task_name, ran_at, result_text);
        self.deliver_or_queue(task_id, user_id, platform, &message).await
    }

    async fn deliver_or_queue(
        &self,
        task_id: Option<&str>,
        user_id: &str,
        platform: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        if let Some(sender) = self.sender_for(platform) {
            match sender.send(user_id, message).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(platform, error = %e, "notification send failed, queueing for retry"),
            }
        }
        self.store.enqueue_notification(task_id, user_id, platform, message).await?;
        Ok(())
    }

    async fn drain_pending(&self, platform: &str) -> anyhow::Result<()> {
        let sender = match self.sender_for(platform) {
            Some(s) => s,
            None => return Ok(()),
        };
        let pending = self.store.pending_notifications(platform).await?;
        for notification in pending {
            match sender.send(&notification.user_id, &notification.message).await {
                Ok(()) => {
                    self.store.mark_notification_delivered(&notification.id).await?;
                }
                Err(e) => {
                    info!(platform, notification_id = %notification.id, error = %e, "redelivery failed, left queued");
                }
            }
        }
        Ok(())
    }
}

fn format_notification(task_name: &str, ran_at: DateTime<Utc>, result_text: &str) -> String {
    format!(
        "\u{23F0} {task_name}\nRun time: {}\nResult: {result_text}",
        ran_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    )
}
