// SPDX-License-Identifier: MPL-2.0

//! The remote-fetch collaborator boundary.
//!
//! Pagination controllers only ever see this trait; the concrete HTTP client
//! lives behind it and tests substitute scripted sources.

use crate::mastodon::types::Status;
use crate::state::AuthContext;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned HTTP {0}")]
    Http(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("invalid request: {0}")]
    Request(String),
}

/// One page of a paged fetch.
///
/// `next_max_id` is the opaque continuation token from the response's
/// pagination metadata. `None` means no further pages.
#[derive(Debug, Clone)]
pub struct BookmarkPage {
    pub statuses: Vec<Status>,
    pub next_max_id: Option<String>,
}

/// Fetches the authenticated account's bookmarked statuses, one page at a
/// time. Transport-level retries and redirects are this layer's business,
/// not the caller's.
pub trait BookmarkSource: Send + Sync + 'static {
    fn fetch_bookmarks(
        &self,
        max_id: Option<&str>,
        auth: &AuthContext,
    ) -> impl Future<Output = Result<BookmarkPage, FetchError>> + Send;
}
