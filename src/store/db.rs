// SPDX-License-Identifier: MPL-2.0

use crate::config::APP_ID;
use crate::store::StoreError;
use crate::store::posts::ActorKind;
use crate::store::schema::SCHEMA;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Emitted after a mutation commits, and only when something actually
/// changed. Replaces the implicit change tracking a managed object graph
/// would give us: observers subscribe explicitly and re-query on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    PostInserted { identifier: String },
    PostCountersChanged { identifier: String },
    PostActorChanged {
        identifier: String,
        kind: ActorKind,
        account: String,
        present: bool,
    },
    PostDeletionChanged { identifier: String, deleted: bool },
    PostPinnedChanged {
        identifier: String,
        account: String,
        pinned: bool,
    },
    AccountInserted { identifier: String },
    AccountUpdated { identifier: String },
    TimelineChanged { owner: String },
}

/// Handle to the object-graph database for one signed-in account.
#[derive(Clone)]
pub struct StoreDb {
    conn: Arc<Mutex<Connection>>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreDb {
    /// Open or create the store for the given account key.
    /// Path: `~/.local/share/io.github.roostclient.Roost/{account_key}/store.db`
    pub fn open(account_key: &str) -> Result<Self, StoreError> {
        let path = Self::store_path(account_key)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Path(format!("failed to create store dir: {}", e)))?;
        }

        let conn = Connection::open(&path)?;
        Self::migrate(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// In-memory store, used by tests and previews.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            events,
        }
    }

    /// Run schema migrations
    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        // Execute the schema (all CREATE IF NOT EXISTS)
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get XDG data directory for the store
    fn store_path(account_key: &str) -> Result<PathBuf, StoreError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StoreError::Path("could not find data directory".to_string()))?;

        // Sanitize for filesystem (account keys look like user@domain)
        let safe_key = account_key.replace(['/', ':'], "_");

        Ok(data_dir.join(APP_ID).join(safe_key).join("store.db"))
    }

    /// Access the connection for operations. Single writer at a time.
    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    /// Subscribe to committed change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Broadcast a committed change. Dropped silently when nobody listens.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// Current wall-clock time, the timestamp recorded for local mutations.
    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_runs_schema() {
        let db = StoreDb::open_in_memory().expect("open");
        let conn = db.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'posts'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_events_reach_subscribers() {
        let db = StoreDb::open_in_memory().expect("open");
        let mut rx = db.subscribe();
        db.emit(StoreEvent::PostInserted {
            identifier: "1@example.social".to_string(),
        });
        let event = rx.try_recv().expect("event");
        assert_eq!(
            event,
            StoreEvent::PostInserted {
                identifier: "1@example.social".to_string()
            }
        );
    }
}
