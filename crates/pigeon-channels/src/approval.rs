// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The approval rendezvous: a platform-specific human answers a single
//! yes/no question about a pending tool call, bounded by a timeout that
//! resolves to deny so no loop waits forever.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Describes the tool call awaiting a human decision.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    /// Correlates an out-of-band decision (e.g. a `/approve <id>` reply)
    /// back to this specific wait. Opaque to handlers that resolve the
    /// decision some other way.
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub tool_name: String,
    pub description: String,
    /// Set when the call carries a monetary amount, e.g. a payment tool,
    /// so handlers can render it without parsing `description`.
    pub amount: Option<f64>,
}

#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn ask(&self, pending: &PendingApproval) -> bool;
}

/// Race a registered handler against `timeout`; no handler at all is an
/// immediate deny rather than a wait.
pub async fn resolve(
    handler: Option<&(dyn ApprovalHandler)>,
    pending: &PendingApproval,
    timeout: Duration,
) -> bool {
    let Some(handler) = handler else {
        warn!(platform = %pending.platform, tool = %pending.tool_name, "no approval handler registered, denying");
        return false;
    };

    match tokio::time::timeout(timeout, handler.ask(pending)).await {
        Ok(approved) => approved,
        Err(_) => {
            warn!(platform = %pending.platform, tool = %pending.tool_name, "approval timed out, denying");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingApproval {
        PendingApproval {
            id: "appr_1".into(),
            user_id: "u1".into(),
            platform: "discord".into(),
            tool_name: "send_payment".into(),
            description: "pay $50 to acme".into(),
            amount: Some(50.0),
        }
    }

    struct Always(bool);

    #[async_trait]
    impl ApprovalHandler for Always {
        async fn ask(&self, _pending: &PendingApproval) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn no_handler_denies_immediately() {
        let approved = resolve(None, &pending(), Duration::from_millis(50)).await;
        assert!(!approved);
    }

    #[tokio::test]
    async fn registered_handler_decision_is_honored() {
        let handler = Always(true);
        let approved = resolve(Some(&handler), &pending(), Duration::from_millis(50)).await;
        assert!(approved);
    }

    #[tokio::test]
    async fn slow_handler_times_out_to_deny() {
        struct Slow;
        #[async_trait]
        impl ApprovalHandler for Slow {
            async fn ask(&self, _pending: &PendingApproval) -> bool {
                tokio::time::sleep(Duration::from_secs(10)).await;
                true
            }
        }
        let approved = resolve(Some(&Slow), &pending(), Duration::from_millis(20)).await;
        assert!(!approved);
    }
}
