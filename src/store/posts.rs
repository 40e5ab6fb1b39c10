// SPDX-License-Identifier: MPL-2.0

use crate::mastodon::{Application, CustomEmoji, MediaAttachment, Mention, Tag};
use crate::store::{StoreDb, StoreError, StoreEvent, identifier};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

/// The "account did X to post" relation sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Favourite,
    Reblog,
    Mute,
    Bookmark,
}

impl ActorKind {
    pub const ALL: [ActorKind; 4] = [
        ActorKind::Favourite,
        ActorKind::Reblog,
        ActorKind::Mute,
        ActorKind::Bookmark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::Favourite => "favourite",
            ActorKind::Reblog => "reblog",
            ActorKind::Mute => "mute",
            ActorKind::Bookmark => "bookmark",
        }
    }
}

/// Immutable property bag for creating a post record.
///
/// Everything here is fixed at insert time; only counters, relations, the
/// soft-delete flag and `updated_at` may change afterwards.
#[derive(Debug, Clone)]
pub struct PostProperty {
    pub domain: String,
    pub remote_id: String,
    pub uri: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub visibility: Option<String>,
    pub sensitive: bool,
    pub spoiler_text: Option<String>,
    pub reblogs_count: i64,
    pub favourites_count: i64,
    pub replies_count: Option<i64>,
    pub url: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    pub language: Option<String>,
    pub text: Option<String>,
    /// Timestamp of the server response this property bag came from.
    pub network_date: DateTime<Utc>,
}

impl PostProperty {
    pub fn identifier(&self) -> String {
        identifier(&self.remote_id, &self.domain)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub identifier: String,
    pub domain: String,
    pub remote_id: String,
    pub uri: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub visibility: Option<String>,
    pub sensitive: bool,
    pub spoiler_text: Option<String>,
    pub application: Option<Application>,
    pub reblogs_count: i64,
    pub favourites_count: i64,
    pub replies_count: Option<i64>,
    pub url: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    pub language: Option<String>,
    pub text: Option<String>,
    pub author_identifier: String,
    pub reblog_identifier: Option<String>,
    pub pinned_by_identifier: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PostRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Actor-relation seeds attached at insert time. Only provided members are
/// recorded; relation sets start empty otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertRelations<'a> {
    pub favourited_by: Option<&'a str>,
    pub reblogged_by: Option<&'a str>,
    pub muted_by: Option<&'a str>,
    pub bookmarked_by: Option<&'a str>,
    pub pinned_by: Option<&'a str>,
}

/// Lookup predicates, composable with logical AND. Empty query matches all.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub domain: Option<String>,
    pub remote_id: Option<String>,
    pub remote_ids: Option<Vec<String>>,
    /// `Some(false)` for live posts, `Some(true)` for soft-deleted ones.
    pub deleted: Option<bool>,
}

const POST_COLUMNS: &str = "identifier, domain, remote_id, uri, created_at, content, \
    visibility, sensitive, spoiler_text, application_json, \
    reblogs_count, favourites_count, replies_count, \
    url, in_reply_to_id, in_reply_to_account_id, language, text, \
    author_identifier, reblog_identifier, pinned_by_identifier, \
    updated_at, deleted_at";

/// Store operations for posts
pub struct PostStore<'a> {
    db: &'a StoreDb,
}

impl<'a> PostStore<'a> {
    pub fn new(db: &'a StoreDb) -> Self {
        Self { db }
    }

    /// Create a new record from an immutable property bag plus resolved
    /// references to already-persisted related entities.
    ///
    /// Fails with [`StoreError::MissingAuthor`] when `author` has not been
    /// persisted; callers resolve accounts first.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        property: &PostProperty,
        author: &super::AccountRecord,
        reblog: Option<&PostRecord>,
        application: Option<&Application>,
        mentions: &[Mention],
        emojis: &[CustomEmoji],
        tags: &[Tag],
        media_attachments: &[MediaAttachment],
        relations: &InsertRelations<'_>,
    ) -> Result<PostRecord, StoreError> {
        let record = {
            let mut conn = self.db.conn();
            let tx = conn.transaction()?;
            let record = insert_tx(
                &tx,
                property,
                &author.identifier,
                reblog.map(|r| r.identifier.as_str()),
                application,
                mentions,
                emojis,
                tags,
                media_attachments,
                relations,
            )?;
            tx.commit()?;
            record
        };
        self.db.emit(StoreEvent::PostInserted {
            identifier: record.identifier.clone(),
        });
        Ok(record)
    }

    /// Composite-key lookup, no side effects.
    pub fn find(&self, domain: &str, remote_id: &str) -> Result<Option<PostRecord>, StoreError> {
        let conn = self.db.conn();
        find_tx(&conn, domain, remote_id)
    }

    /// Fetch records matching the query, newest creation time first.
    pub fn query(&self, query: &PostQuery) -> Result<Vec<PostRecord>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(domain) = &query.domain {
            values.push(domain.clone());
            clauses.push(format!("domain = ?{}", values.len()));
        }
        if let Some(remote_id) = &query.remote_id {
            values.push(remote_id.clone());
            clauses.push(format!("remote_id = ?{}", values.len()));
        }
        if let Some(remote_ids) = &query.remote_ids {
            if remote_ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = remote_ids
                .iter()
                .map(|id| {
                    values.push(id.clone());
                    format!("?{}", values.len())
                })
                .collect();
            clauses.push(format!("remote_id IN ({})", placeholders.join(", ")));
        }
        match query.deleted {
            Some(true) => clauses.push("deleted_at IS NOT NULL".to_string()),
            Some(false) => clauses.push("deleted_at IS NULL".to_string()),
            None => {}
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts {where_sql} ORDER BY created_at DESC"
        );

        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Change-suppressed counter reconciliation. Each counter is
    /// independently optional; a `None` replies count means "unknown" and is
    /// never written over a known value.
    pub fn update_counters(
        &self,
        domain: &str,
        remote_id: &str,
        reblogs_count: Option<i64>,
        favourites_count: Option<i64>,
        replies_count: Option<i64>,
    ) -> Result<bool, StoreError> {
        let changed = {
            let conn = self.db.conn();
            let record = find_tx(&conn, domain, remote_id)?
                .ok_or_else(|| StoreError::NotFound(identifier(remote_id, domain)))?;
            update_counters_tx(&conn, &record, reblogs_count, favourites_count, replies_count)?
        };
        if changed {
            self.db.emit(StoreEvent::PostCountersChanged {
                identifier: identifier(remote_id, domain),
            });
        }
        Ok(changed)
    }

    /// Idempotently add or remove `account` from the named relation set.
    /// No-op when already in the desired state.
    pub fn update_actor(
        &self,
        domain: &str,
        remote_id: &str,
        kind: ActorKind,
        account_identifier: &str,
        present: bool,
    ) -> Result<bool, StoreError> {
        let id = identifier(remote_id, domain);
        let changed = {
            let conn = self.db.conn();
            find_tx(&conn, domain, remote_id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            update_actor_tx(&conn, &id, kind, account_identifier, present)?
        };
        if changed {
            self.db.emit(StoreEvent::PostActorChanged {
                identifier: id,
                kind,
                account: account_identifier.to_string(),
                present,
            });
        }
        Ok(changed)
    }

    /// Accounts in the named relation set. An empty set and a never-written
    /// set are indistinguishable, by design.
    pub fn actors(
        &self,
        domain: &str,
        remote_id: &str,
        kind: ActorKind,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT account_identifier FROM post_actors
             WHERE post_identifier = ?1 AND kind = ?2
             ORDER BY account_identifier",
        )?;
        let mut rows = stmt.query(params![identifier(remote_id, domain), kind.as_str()])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(row.get(0)?);
        }
        Ok(accounts)
    }

    pub fn has_actor(
        &self,
        domain: &str,
        remote_id: &str,
        kind: ActorKind,
        account_identifier: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.db.conn();
        has_actor_tx(&conn, &identifier(remote_id, domain), kind, account_identifier)
    }

    /// Move the post's single `pinned_by` slot to (or away from) `account`.
    pub fn update_pinned(
        &self,
        domain: &str,
        remote_id: &str,
        account_identifier: &str,
        pinned: bool,
    ) -> Result<bool, StoreError> {
        let id = identifier(remote_id, domain);
        let changed = {
            let conn = self.db.conn();
            let record =
                find_tx(&conn, domain, remote_id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            update_pinned_tx(&conn, &record, account_identifier, pinned)?
        };
        if changed {
            self.db.emit(StoreEvent::PostPinnedChanged {
                identifier: id,
                account: account_identifier.to_string(),
                pinned,
            });
        }
        Ok(changed)
    }

    /// Soft-delete: a flag set, never a row removal, so reply threads and
    /// reblog chains pointing here stay resolvable.
    pub fn mark_deleted(
        &self,
        domain: &str,
        remote_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.set_deleted_at(domain, remote_id, Some(at))
    }

    pub fn mark_undeleted(&self, domain: &str, remote_id: &str) -> Result<bool, StoreError> {
        self.set_deleted_at(domain, remote_id, None)
    }

    fn set_deleted_at(
        &self,
        domain: &str,
        remote_id: &str,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let id = identifier(remote_id, domain);
        let changed = {
            let conn = self.db.conn();
            let record =
                find_tx(&conn, domain, remote_id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if record.deleted_at.is_some() == deleted_at.is_some() {
                false
            } else {
                conn.execute(
                    "UPDATE posts SET deleted_at = ?1 WHERE identifier = ?2",
                    params![deleted_at, id],
                )?;
                true
            }
        };
        if changed {
            self.db.emit(StoreEvent::PostDeletionChanged {
                identifier: id,
                deleted: deleted_at.is_some(),
            });
        }
        Ok(changed)
    }

    /// Advance `updated_at` to a server response timestamp. Never implicit.
    pub fn touch(
        &self,
        domain: &str,
        remote_id: &str,
        network_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.db.conn();
        touch_tx(&conn, &identifier(remote_id, domain), network_date)
    }

    pub fn mentions(&self, domain: &str, remote_id: &str) -> Result<Vec<Mention>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT account_remote_id, username, acct, url FROM mentions
             WHERE post_identifier = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([identifier(remote_id, domain)])?;
        let mut mentions = Vec::new();
        while let Some(row) = rows.next()? {
            mentions.push(Mention {
                id: row.get(0)?,
                username: row.get(1)?,
                acct: row.get(2)?,
                url: row.get(3)?,
            });
        }
        Ok(mentions)
    }

    pub fn tags(&self, domain: &str, remote_id: &str) -> Result<Vec<Tag>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT name, url FROM tags WHERE post_identifier = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([identifier(remote_id, domain)])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(Tag {
                name: row.get(0)?,
                url: row.get(1)?,
            });
        }
        Ok(tags)
    }

    pub fn emojis(&self, domain: &str, remote_id: &str) -> Result<Vec<CustomEmoji>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT shortcode, url, static_url FROM emojis
             WHERE post_identifier = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([identifier(remote_id, domain)])?;
        let mut emojis = Vec::new();
        while let Some(row) = rows.next()? {
            emojis.push(CustomEmoji {
                shortcode: row.get(0)?,
                url: row.get(1)?,
                static_url: row.get(2)?,
            });
        }
        Ok(emojis)
    }

    pub fn media_attachments(
        &self,
        domain: &str,
        remote_id: &str,
    ) -> Result<Vec<MediaAttachment>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT remote_id, kind, url, preview_url, description FROM media_attachments
             WHERE post_identifier = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([identifier(remote_id, domain)])?;
        let mut media = Vec::new();
        while let Some(row) = rows.next()? {
            media.push(MediaAttachment {
                id: row.get(0)?,
                kind: row.get(1)?,
                url: row.get(2)?,
                preview_url: row.get(3)?,
                description: row.get(4)?,
            });
        }
        Ok(media)
    }
}

/// Transactional insert body, shared with the merge engine.
#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_tx(
    conn: &Connection,
    property: &PostProperty,
    author_identifier: &str,
    reblog_identifier: Option<&str>,
    application: Option<&Application>,
    mentions: &[Mention],
    emojis: &[CustomEmoji],
    tags: &[Tag],
    media_attachments: &[MediaAttachment],
    relations: &InsertRelations<'_>,
) -> Result<PostRecord, StoreError> {
    let author_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM accounts WHERE identifier = ?1",
            [author_identifier],
            |row| row.get(0),
        )
        .optional()?;
    if author_exists.is_none() {
        return Err(StoreError::MissingAuthor(author_identifier.to_string()));
    }

    let id = property.identifier();
    let application_json = application.map(serde_json::to_string).transpose()?;

    conn.execute(
        r#"
        INSERT INTO posts (
            identifier, domain, remote_id, uri, created_at, content,
            visibility, sensitive, spoiler_text, application_json,
            reblogs_count, favourites_count, replies_count,
            url, in_reply_to_id, in_reply_to_account_id, language, text,
            author_identifier, reblog_identifier, pinned_by_identifier,
            updated_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, NULL)
        "#,
        params![
            id,
            property.domain,
            property.remote_id,
            property.uri,
            property.created_at,
            property.content,
            property.visibility,
            property.sensitive,
            property.spoiler_text,
            application_json,
            property.reblogs_count,
            property.favourites_count,
            property.replies_count,
            property.url,
            property.in_reply_to_id,
            property.in_reply_to_account_id,
            property.language,
            property.text,
            author_identifier,
            reblog_identifier,
            relations.pinned_by,
            property.network_date,
        ],
    )?;

    for mention in mentions {
        conn.execute(
            "INSERT INTO mentions (post_identifier, account_remote_id, username, acct, url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, mention.id, mention.username, mention.acct, mention.url],
        )?;
    }
    for emoji in emojis {
        conn.execute(
            "INSERT INTO emojis (post_identifier, shortcode, url, static_url)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, emoji.shortcode, emoji.url, emoji.static_url],
        )?;
    }
    for tag in tags {
        conn.execute(
            "INSERT INTO tags (post_identifier, name, url) VALUES (?1, ?2, ?3)",
            params![id, tag.name, tag.url],
        )?;
    }
    for media in media_attachments {
        conn.execute(
            "INSERT INTO media_attachments (post_identifier, remote_id, kind, url, preview_url, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, media.id, media.kind, media.url, media.preview_url, media.description],
        )?;
    }

    let seeds = [
        (ActorKind::Favourite, relations.favourited_by),
        (ActorKind::Reblog, relations.reblogged_by),
        (ActorKind::Mute, relations.muted_by),
        (ActorKind::Bookmark, relations.bookmarked_by),
    ];
    for (kind, account) in seeds {
        if let Some(account) = account {
            update_actor_tx(conn, &id, kind, account, true)?;
        }
    }

    find_tx(conn, &property.domain, &property.remote_id)?.ok_or(StoreError::NotFound(id))
}

pub(crate) fn find_tx(
    conn: &Connection,
    domain: &str,
    remote_id: &str,
) -> Result<Option<PostRecord>, StoreError> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE domain = ?1 AND remote_id = ?2"
    );
    let record = conn
        .query_row(&sql, params![domain, remote_id], row_to_record)
        .optional()?;
    Ok(record)
}

pub(crate) fn update_counters_tx(
    conn: &Connection,
    record: &PostRecord,
    reblogs_count: Option<i64>,
    favourites_count: Option<i64>,
    replies_count: Option<i64>,
) -> Result<bool, StoreError> {
    let mut changed = false;

    if let Some(count) = reblogs_count {
        if count != record.reblogs_count {
            conn.execute(
                "UPDATE posts SET reblogs_count = ?1 WHERE identifier = ?2",
                params![count, record.identifier],
            )?;
            changed = true;
        }
    }
    if let Some(count) = favourites_count {
        if count != record.favourites_count {
            conn.execute(
                "UPDATE posts SET favourites_count = ?1 WHERE identifier = ?2",
                params![count, record.identifier],
            )?;
            changed = true;
        }
    }
    if let Some(count) = replies_count {
        if record.replies_count != Some(count) {
            conn.execute(
                "UPDATE posts SET replies_count = ?1 WHERE identifier = ?2",
                params![count, record.identifier],
            )?;
            changed = true;
        }
    }

    Ok(changed)
}

pub(crate) fn update_actor_tx(
    conn: &Connection,
    post_identifier: &str,
    kind: ActorKind,
    account_identifier: &str,
    present: bool,
) -> Result<bool, StoreError> {
    let exists = has_actor_tx(conn, post_identifier, kind, account_identifier)?;
    if present == exists {
        return Ok(false);
    }
    if present {
        conn.execute(
            "INSERT INTO post_actors (post_identifier, account_identifier, kind)
             VALUES (?1, ?2, ?3)",
            params![post_identifier, account_identifier, kind.as_str()],
        )?;
    } else {
        conn.execute(
            "DELETE FROM post_actors
             WHERE post_identifier = ?1 AND account_identifier = ?2 AND kind = ?3",
            params![post_identifier, account_identifier, kind.as_str()],
        )?;
    }
    Ok(true)
}

fn has_actor_tx(
    conn: &Connection,
    post_identifier: &str,
    kind: ActorKind,
    account_identifier: &str,
) -> Result<bool, StoreError> {
    let row: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM post_actors
             WHERE post_identifier = ?1 AND account_identifier = ?2 AND kind = ?3",
            params![post_identifier, account_identifier, kind.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

pub(crate) fn update_pinned_tx(
    conn: &Connection,
    record: &PostRecord,
    account_identifier: &str,
    pinned: bool,
) -> Result<bool, StoreError> {
    let desired = if pinned { Some(account_identifier) } else { None };
    let current = record.pinned_by_identifier.as_deref();
    // Un-pinning only clears the slot when this account holds it.
    if pinned && current == desired || !pinned && current != Some(account_identifier) {
        return Ok(false);
    }
    conn.execute(
        "UPDATE posts SET pinned_by_identifier = ?1 WHERE identifier = ?2",
        params![desired, record.identifier],
    )?;
    Ok(true)
}

pub(crate) fn touch_tx(
    conn: &Connection,
    post_identifier: &str,
    network_date: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE posts SET updated_at = ?1 WHERE identifier = ?2",
        params![network_date, post_identifier],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row) -> Result<PostRecord, rusqlite::Error> {
    let application_json: Option<String> = row.get(9)?;
    let application: Option<Application> = application_json
        .as_ref()
        .and_then(|json| serde_json::from_str(json).ok());

    Ok(PostRecord {
        identifier: row.get(0)?,
        domain: row.get(1)?,
        remote_id: row.get(2)?,
        uri: row.get(3)?,
        created_at: row.get(4)?,
        content: row.get(5)?,
        visibility: row.get(6)?,
        sensitive: row.get(7)?,
        spoiler_text: row.get(8)?,
        application,
        reblogs_count: row.get(10)?,
        favourites_count: row.get(11)?,
        replies_count: row.get(12)?,
        url: row.get(13)?,
        in_reply_to_id: row.get(14)?,
        in_reply_to_account_id: row.get(15)?,
        language: row.get(16)?,
        text: row.get(17)?,
        author_identifier: row.get(18)?,
        reblog_identifier: row.get(19)?,
        pinned_by_identifier: row.get(20)?,
        updated_at: row.get(21)?,
        deleted_at: row.get(22)?,
    })
}
