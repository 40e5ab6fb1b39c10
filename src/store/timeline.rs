// SPDX-License-Identifier: MPL-2.0

use crate::store::{StoreDb, StoreError, StoreEvent};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Placement records that materialize one account's home timeline ordering.
///
/// Denormalized on purpose: the timeline is an ordering over posts, not a
/// property of any post, so it gets its own rows keyed by the owning
/// account.
pub struct TimelineStore<'a> {
    db: &'a StoreDb,
}

impl<'a> TimelineStore<'a> {
    pub fn new(db: &'a StoreDb) -> Self {
        Self { db }
    }

    /// Record (or re-position) a post in the owner's home timeline.
    /// Re-recording with an unchanged `sort_at` is a no-op.
    pub fn record(
        &self,
        owner_identifier: &str,
        post_identifier: &str,
        sort_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = {
            let conn = self.db.conn();
            conn.execute(
                r#"
                INSERT INTO timeline_items (owner_identifier, post_identifier, sort_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(owner_identifier, post_identifier) DO UPDATE SET
                    sort_at = excluded.sort_at
                WHERE sort_at != excluded.sort_at
                "#,
                params![owner_identifier, post_identifier, sort_at],
            )? > 0
        };
        if changed {
            self.db.emit(StoreEvent::TimelineChanged {
                owner: owner_identifier.to_string(),
            });
        }
        Ok(changed)
    }

    /// Post identifiers in the owner's timeline, newest first.
    pub fn ids(
        &self,
        owner_identifier: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT post_identifier FROM timeline_items
             WHERE owner_identifier = ?1
             ORDER BY sort_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![owner_identifier, limit as i64, offset as i64])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    pub fn count(&self, owner_identifier: &str) -> Result<usize, StoreError> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM timeline_items WHERE owner_identifier = ?1",
            [owner_identifier],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Drop the owner's placements, e.g. on a full timeline refresh.
    pub fn clear(&self, owner_identifier: &str) -> Result<(), StoreError> {
        let removed = {
            let conn = self.db.conn();
            conn.execute(
                "DELETE FROM timeline_items WHERE owner_identifier = ?1",
                [owner_identifier],
            )?
        };
        if removed > 0 {
            self.db.emit(StoreEvent::TimelineChanged {
                owner: owner_identifier.to_string(),
            });
        }
        Ok(())
    }
}
