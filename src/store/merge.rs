// SPDX-License-Identifier: MPL-2.0

//! Upsert engine: one freshly fetched status in, a minimal set of store
//! mutations out.
//!
//! A single call is one logical unit. The author account, any reblogged
//! status (recursively), the outer post and its children all land in one
//! rusqlite transaction; a failure anywhere rolls the whole thing back.
//! Change events are queued during the transaction and broadcast only after
//! commit.

use crate::mastodon::{Account, Status};
use crate::store::db::{StoreDb, StoreEvent};
use crate::store::posts::{ActorKind, InsertRelations, PostProperty};
use crate::store::{AccountProperty, StoreError, accounts, posts};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Upsert a fetched status representation into the local graph.
///
/// `viewer` is the identifier of the signed-in account; when present, the
/// representation's relation flags (`favourited`, `reblogged`, `muted`,
/// `bookmarked`, `pinned`) are treated as fresh relation knowledge for that
/// account. Returns the post identifier.
pub fn upsert_status(
    db: &StoreDb,
    domain: &str,
    status: &Status,
    viewer: Option<&str>,
    network_date: DateTime<Utc>,
) -> Result<String, StoreError> {
    let mut events = Vec::new();
    let identifier = {
        let mut conn = db.conn();
        let tx = conn.transaction()?;
        let identifier = upsert_status_tx(&tx, domain, status, viewer, network_date, &mut events)?;
        tx.commit()?;
        identifier
    };
    for event in events {
        db.emit(event);
    }
    Ok(identifier)
}

/// Recursive transactional body. The reblog target (if any) is upserted
/// before the outer record references it; the protocol permits reblog
/// chains and so does this, by recursing to whatever depth the
/// representation carries.
fn upsert_status_tx(
    conn: &Connection,
    domain: &str,
    status: &Status,
    viewer: Option<&str>,
    network_date: DateTime<Utc>,
    events: &mut Vec<StoreEvent>,
) -> Result<String, StoreError> {
    let author = upsert_account_tx(conn, domain, &status.account, network_date, events)?;

    let reblog_identifier = match status.reblog.as_deref() {
        Some(target) => Some(upsert_status_tx(
            conn,
            domain,
            target,
            viewer,
            network_date,
            events,
        )?),
        None => None,
    };

    match posts::find_tx(conn, domain, &status.id)? {
        None => {
            let property = post_property(domain, status, network_date);
            let relations = viewer_relations(status, viewer);
            let record = posts::insert_tx(
                conn,
                &property,
                &author.identifier,
                reblog_identifier.as_deref(),
                status.application.as_ref(),
                &status.mentions,
                &status.emojis,
                &status.tags,
                &status.media_attachments,
                &relations,
            )?;
            events.push(StoreEvent::PostInserted {
                identifier: record.identifier.clone(),
            });
            Ok(record.identifier)
        }
        Some(existing) => {
            // Reconcile only what legitimately changes post-creation:
            // counters, relation knowledge, updated_at. Content, URI and
            // creation time stay untouched; server-side edits are a
            // separate feature this engine does not handle.
            let counters_changed = posts::update_counters_tx(
                conn,
                &existing,
                Some(status.reblogs_count),
                Some(status.favourites_count),
                status.replies_count,
            )?;
            if counters_changed {
                events.push(StoreEvent::PostCountersChanged {
                    identifier: existing.identifier.clone(),
                });
            }

            if let Some(viewer) = viewer {
                let flags = [
                    (ActorKind::Favourite, status.favourited),
                    (ActorKind::Reblog, status.reblogged),
                    (ActorKind::Mute, status.muted),
                    (ActorKind::Bookmark, status.bookmarked),
                ];
                for (kind, flag) in flags {
                    let Some(present) = flag else { continue };
                    if posts::update_actor_tx(conn, &existing.identifier, kind, viewer, present)? {
                        events.push(StoreEvent::PostActorChanged {
                            identifier: existing.identifier.clone(),
                            kind,
                            account: viewer.to_string(),
                            present,
                        });
                    }
                }
                if let Some(pinned) = status.pinned {
                    if posts::update_pinned_tx(conn, &existing, viewer, pinned)? {
                        events.push(StoreEvent::PostPinnedChanged {
                            identifier: existing.identifier.clone(),
                            account: viewer.to_string(),
                            pinned,
                        });
                    }
                }
            }

            posts::touch_tx(conn, &existing.identifier, network_date)?;
            Ok(existing.identifier)
        }
    }
}

fn upsert_account_tx(
    conn: &Connection,
    domain: &str,
    account: &Account,
    network_date: DateTime<Utc>,
    events: &mut Vec<StoreEvent>,
) -> Result<super::AccountRecord, StoreError> {
    let property = AccountProperty {
        domain: domain.to_string(),
        remote_id: account.id.clone(),
        username: account.username.clone(),
        acct: account.acct.clone(),
        display_name: account.display_name.clone(),
        url: account.url.clone(),
        avatar: account.avatar.clone(),
        created_at: account.created_at.unwrap_or(network_date),
        network_date,
    };
    let outcome = accounts::upsert_tx(conn, &property)?;
    match &outcome {
        accounts::UpsertOutcome::Inserted(record) => events.push(StoreEvent::AccountInserted {
            identifier: record.identifier.clone(),
        }),
        accounts::UpsertOutcome::Updated(record) => events.push(StoreEvent::AccountUpdated {
            identifier: record.identifier.clone(),
        }),
        accounts::UpsertOutcome::Unchanged(_) => {}
    }
    Ok(outcome.into_record())
}

fn post_property(domain: &str, status: &Status, network_date: DateTime<Utc>) -> PostProperty {
    PostProperty {
        domain: domain.to_string(),
        remote_id: status.id.clone(),
        uri: status.uri.clone(),
        created_at: status.created_at,
        content: status.content.clone(),
        visibility: status.visibility.clone(),
        sensitive: status.sensitive,
        spoiler_text: status.spoiler_text.clone(),
        reblogs_count: status.reblogs_count,
        favourites_count: status.favourites_count,
        replies_count: status.replies_count,
        url: status.url.clone(),
        in_reply_to_id: status.in_reply_to_id.clone(),
        in_reply_to_account_id: status.in_reply_to_account_id.clone(),
        language: status.language.clone(),
        text: status.text.clone(),
        network_date,
    }
}

fn viewer_relations<'a>(status: &Status, viewer: Option<&'a str>) -> InsertRelations<'a> {
    let Some(viewer) = viewer else {
        return InsertRelations::default();
    };
    let seed = |flag: Option<bool>| -> Option<&'a str> {
        if flag == Some(true) { Some(viewer) } else { None }
    };
    InsertRelations {
        favourited_by: seed(status.favourited),
        reblogged_by: seed(status.reblogged),
        muted_by: seed(status.muted),
        bookmarked_by: seed(status.bookmarked),
        pinned_by: seed(status.pinned),
    }
}
