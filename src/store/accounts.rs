// SPDX-License-Identifier: MPL-2.0

use crate::store::{StoreDb, StoreError, StoreEvent, identifier};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

/// Immutable property bag for creating or reconciling an account record.
#[derive(Debug, Clone)]
pub struct AccountProperty {
    pub domain: String,
    pub remote_id: String,
    pub username: String,
    pub acct: String,
    pub display_name: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the server response this property bag came from.
    pub network_date: DateTime<Utc>,
}

impl AccountProperty {
    pub fn identifier(&self) -> String {
        identifier(&self.remote_id, &self.domain)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub identifier: String,
    pub domain: String,
    pub remote_id: String,
    pub username: String,
    pub acct: String,
    pub display_name: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Store operations for accounts
pub struct AccountStore<'a> {
    db: &'a StoreDb,
}

impl<'a> AccountStore<'a> {
    pub fn new(db: &'a StoreDb) -> Self {
        Self { db }
    }

    /// Find-or-create keyed on `(domain, remote_id)`. Display fields are
    /// reconciled with change suppression; `updated_at` advances to the
    /// property's network date whenever anything changed.
    pub fn upsert(&self, property: &AccountProperty) -> Result<AccountRecord, StoreError> {
        let outcome = {
            let conn = self.db.conn();
            upsert_tx(&conn, property)?
        };
        match &outcome {
            UpsertOutcome::Inserted(record) => self.db.emit(StoreEvent::AccountInserted {
                identifier: record.identifier.clone(),
            }),
            UpsertOutcome::Updated(record) => self.db.emit(StoreEvent::AccountUpdated {
                identifier: record.identifier.clone(),
            }),
            UpsertOutcome::Unchanged(_) => {}
        }
        Ok(outcome.into_record())
    }

    /// Composite-key lookup, no side effects.
    pub fn find(&self, domain: &str, remote_id: &str) -> Result<Option<AccountRecord>, StoreError> {
        let conn = self.db.conn();
        find_tx(&conn, domain, remote_id)
    }
}

pub(crate) enum UpsertOutcome {
    Inserted(AccountRecord),
    Updated(AccountRecord),
    Unchanged(AccountRecord),
}

impl UpsertOutcome {
    pub(crate) fn into_record(self) -> AccountRecord {
        match self {
            Self::Inserted(r) | Self::Updated(r) | Self::Unchanged(r) => r,
        }
    }
}

/// Transactional body of [`AccountStore::upsert`], shared with the merge
/// engine so a whole status upsert stays one unit.
pub(crate) fn upsert_tx(
    conn: &Connection,
    property: &AccountProperty,
) -> Result<UpsertOutcome, StoreError> {
    let id = property.identifier();

    let Some(existing) = find_tx(conn, &property.domain, &property.remote_id)? else {
        conn.execute(
            r#"
            INSERT INTO accounts (
                identifier, domain, remote_id, username, acct,
                display_name, url, avatar, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                id,
                property.domain,
                property.remote_id,
                property.username,
                property.acct,
                property.display_name,
                property.url,
                property.avatar,
                property.created_at,
                property.network_date,
            ],
        )?;
        let record = find_tx(conn, &property.domain, &property.remote_id)?
            .ok_or_else(|| StoreError::NotFound(id))?;
        return Ok(UpsertOutcome::Inserted(record));
    };

    let changed = existing.username != property.username
        || existing.acct != property.acct
        || existing.display_name != property.display_name
        || existing.url != property.url
        || existing.avatar != property.avatar;

    if !changed {
        return Ok(UpsertOutcome::Unchanged(existing));
    }

    conn.execute(
        r#"
        UPDATE accounts
        SET username = ?1, acct = ?2, display_name = ?3, url = ?4, avatar = ?5, updated_at = ?6
        WHERE identifier = ?7
        "#,
        params![
            property.username,
            property.acct,
            property.display_name,
            property.url,
            property.avatar,
            property.network_date,
            id,
        ],
    )?;
    let record = find_tx(conn, &property.domain, &property.remote_id)?
        .ok_or_else(|| StoreError::NotFound(id))?;
    Ok(UpsertOutcome::Updated(record))
}

pub(crate) fn find_tx(
    conn: &Connection,
    domain: &str,
    remote_id: &str,
) -> Result<Option<AccountRecord>, StoreError> {
    let record = conn
        .query_row(
            r#"
            SELECT identifier, domain, remote_id, username, acct,
                   display_name, url, avatar, created_at, updated_at
            FROM accounts
            WHERE domain = ?1 AND remote_id = ?2
            "#,
            params![domain, remote_id],
            row_to_account,
        )
        .optional()?;
    Ok(record)
}

fn row_to_account(row: &rusqlite::Row) -> Result<AccountRecord, rusqlite::Error> {
    Ok(AccountRecord {
        identifier: row.get(0)?,
        domain: row.get(1)?,
        remote_id: row.get(2)?,
        username: row.get(3)?,
        acct: row.get(4)?,
        display_name: row.get(5)?,
        url: row.get(6)?,
        avatar: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
