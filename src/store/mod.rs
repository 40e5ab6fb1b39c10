// SPDX-License-Identifier: MPL-2.0

mod accounts;
mod db;
pub mod merge;
mod posts;
mod schema;
mod timeline;

pub use accounts::{AccountProperty, AccountRecord, AccountStore};
pub use db::{StoreDb, StoreEvent};
pub use posts::{ActorKind, InsertRelations, PostProperty, PostQuery, PostRecord, PostStore};
pub use timeline::TimelineStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("author {0} is not persisted")]
    MissingAuthor(String),
    #[error("post {0} not found")]
    NotFound(String),
    #[error("database path error: {0}")]
    Path(String),
}

/// Globally unique identity for a remote entity: `remote_id@domain`.
/// Stable across re-fetches of the same entity.
pub fn identifier(remote_id: &str, domain: &str) -> String {
    format!("{remote_id}@{domain}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_id_at_domain() {
        assert_eq!(identifier("103", "example.social"), "103@example.social");
    }
}
