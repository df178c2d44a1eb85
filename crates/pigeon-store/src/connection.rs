// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Connection management and schema migration.
//!
//! A single [`rusqlite::Connection`] behind a [`std::sync::Mutex`] backs the
//! whole store. SQLite allows only one writer at a time regardless, so the
//! mutex does not add contention beyond what the database itself imposes;
//! readers and writers both go through `with_conn`, which hops onto a
//! blocking thread so the async runtime is never stalled on disk I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::Connection;
use tracing::debug;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path`, running schema migrations.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::task::spawn_blocking(move || {
            debug!(path = %path.display(), "opening store database");
            let conn = Connection::open(&path).context("opening sqlite database")?;
            conn.pragma_update(None, "journal_mode", "WAL").context("enabling WAL mode")?;
            conn.pragma_update(None, "foreign_keys", "ON").context("enabling foreign keys")?;
            conn.execute_batch(SCHEMA).context("applying schema")?;
            Ok(Self { conn: Arc::new(Mutex::new(conn)) })
        })
        .await
        .context("store init task panicked")?
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        tokio::task::spawn_blocking(|| {
            let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
            conn.execute_batch(SCHEMA).context("applying schema")?;
            Ok(Self { conn: Arc::new(Mutex::new(conn)) })
        })
        .await
        .context("store init task panicked")?
    }

    /// Run a blocking closure against the connection on a blocking thread.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| anyhow::anyhow!("store connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .context("store task panicked")?
    }
}
