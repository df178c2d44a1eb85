// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Embedded SQLite storage for conversation history, long-lived user
//! memories, the tool failure log, and scheduled tasks.
//!
//! Everything goes through a single [`Store`] handle backed by one
//! connection; see [`connection`] for why that's sufficient here.

mod connection;
mod conversations;
mod failures;
mod memory;
mod scheduled;

pub use connection::Store;
pub use conversations::{Conversation, Message, Role};
pub use failures::{FailureRecord, FailureSummary};
pub use memory::{MemoryEntry, MemoryType};
pub use scheduled::{ExecutionRecord, PendingNotification, ScheduledTask};
