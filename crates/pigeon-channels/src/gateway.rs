// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A generic [`ApprovalHandler`] that renders the pending decision as a
//! plain message through the bus and waits for an external caller to
//! resolve it by id, rather than polling a platform-specific UI itself.
//!
//! Platform adapters that have no richer interaction model (buttons,
//! reactions) than plain text can register this as their handler and let
//! the user reply with a command; whatever parses that reply then calls
//! [`ApprovalGateway::approve`] or [`ApprovalGateway::deny`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{ApprovalHandler, NotificationBus, PendingApproval};

pub struct ApprovalGateway {
    bus: Arc<NotificationBus>,
    waiters: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl ApprovalGateway {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self { bus, waiters: Mutex::new(HashMap::new()) }
    }

    /// Resolve an open wait as approved. A no-op if `id` is unknown or was
    /// already resolved.
    pub fn approve(&self, id: &str) {
        self.resolve(id, true);
    }

    /// Resolve an open wait as denied. A no-op if `id` is unknown or was
    /// already resolved.
    pub fn deny(&self, id: &str) {
        self.resolve(id, false);
    }

    fn resolve(&self, id: &str, decision: bool) {
        if let Some(tx) = self.waiters.lock().expect("approval waiters lock poisoned").remove(id) {
            let _ = tx.send(decision);
        }
    }

    /// Removes `id` unconditionally. Called when the wait is abandoned
    /// (e.g. the caller's own timeout fired) so it doesn't linger forever.
    fn forget(&self, id: &str) {
        self.waiters.lock().expect("approval waiters lock poisoned").remove(id);
    }
}

#[async_trait]
impl ApprovalHandler for ApprovalGateway {
    async fn ask(&self, pending: &PendingApproval) -> bool {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().expect("approval waiters lock poisoned").insert(pending.id.clone(), tx);

        let message = render(pending);
        if let Err(e) = self.bus.send_raw(&pending.platform, &pending.user_id, &message).await {
            tracing::warn!(platform = %pending.platform, error = %e, "failed to render approval prompt");
        }

        // Dropping this future (the caller's timeout firing) cancels the
        // `rx.await` without running either match arm, so the cleanup
        // lives in a guard rather than after the await.
        let guard = ForgetGuard { gateway: self, id: pending.id.clone(), armed: true };
        let decision = rx.await.unwrap_or(false);
        guard.disarm();
        decision
    }
}

struct ForgetGuard<'a> {
    gateway: &'a ApprovalGateway,
    id: String,
    armed: bool,
}

impl ForgetGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ForgetGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gateway.forget(&self.id);
        }
    }
}

fn render(pending: &PendingApproval) -> String {
    let mut text = format!("Approval needed for {}: {}", pending.tool_name, pending.description);
    if let Some(amount) = pending.amount {
        text.push_str(&format!(" (amount: {amount:.2})"));
    }
    text.push_str(&format!("\nReply \"/approve {}\" or \"/deny {}\"", pending.id, pending.id));
    text
}

/// Generates the id a new [`PendingApproval`] should carry before it is
/// handed to a gateway or any other handler.
pub fn new_approval_id() -> String {
    format!("appr_{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pigeon_store::Store;

    use super::*;
    use crate::approval::resolve;

    fn pending(id: &str) -> PendingApproval {
        PendingApproval {
            id: id.to_string(),
            user_id: "u1".into(),
            platform: "web".into(),
            tool_name: "send_payment".into(),
            description: "pay $50 to acme".into(),
            amount: Some(50.0),
        }
    }

    #[tokio::test]
    async fn approve_resolves_the_matching_wait() {
        let store = Store::open_in_memory().await.unwrap();
        let bus = Arc::new(NotificationBus::new(store));
        let gateway = Arc::new(ApprovalGateway::new(bus));

        let p = pending("appr_1");
        let gw = gateway.clone();
        let id = p.id.clone();
        let waiter = tokio::spawn(async move { resolve(Some(gw.as_ref()), &p, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway.approve(&id);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn deny_resolves_false() {
        let store = Store::open_in_memory().await.unwrap();
        let bus = Arc::new(NotificationBus::new(store));
        let gateway = Arc::new(ApprovalGateway::new(bus));

        let p = pending("appr_2");
        let gw = gateway.clone();
        let id = p.id.clone();
        let waiter = tokio::spawn(async move { resolve(Some(gw.as_ref()), &p, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway.deny(&id);

        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn unknown_id_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        let bus = Arc::new(NotificationBus::new(store));
        let gateway = ApprovalGateway::new(bus);
        gateway.approve("no-such-id");
    }

    #[tokio::test]
    async fn timeout_denies_and_late_approve_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        let bus = Arc::new(NotificationBus::new(store));
        let gateway = Arc::new(ApprovalGateway::new(bus));

        let p = pending("appr_3");
        let approved = resolve(Some(gateway.as_ref()), &p, Duration::from_millis(20)).await;
        assert!(!approved);

        // The wait already cleaned itself up on timeout drop; a late
        // decision has nothing left to resolve.
        gateway.approve("appr_3");
    }
}
