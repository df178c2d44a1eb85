// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Platform-facing notification bus: outbound message delivery with a
//! durable fallback queue, and the approval rendezvous tool calls wait on
//! before a side effect is allowed to run.

mod approval;
mod bus;
mod gateway;

pub use approval::{resolve as resolve_approval, ApprovalHandler, PendingApproval};
pub use bus::{NotificationBus, OutboundSender};
pub use gateway::{new_approval_id, ApprovalGateway};
