// SPDX-License-Identifier: MPL-2.0

//! Thin REST client for the endpoints the data layer drives.
//!
//! Wraps reqwest so the rest of the crate only sees our own types. Paged
//! endpoints signal continuation through an RFC 5988 `Link` header whose
//! `rel="next"` target carries a `max_id` query parameter; that token is the
//! cursor the pagination machines hand back on the next call.

use crate::config::PAGE_LIMIT;
use crate::mastodon::fetch::{BookmarkPage, BookmarkSource, FetchError};
use crate::mastodon::types::Status;
use crate::state::AuthContext;
use std::future::Future;

pub struct MastodonClient {
    http: reqwest::Client,
}

impl MastodonClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn get_bookmarks(
        &self,
        max_id: Option<&str>,
        auth: &AuthContext,
    ) -> Result<BookmarkPage, FetchError> {
        let mut endpoint = url::Url::parse(&format!("https://{}/api/v1/bookmarks", auth.domain))
            .map_err(|e| FetchError::Request(e.to_string()))?;
        {
            let mut query = endpoint.query_pairs_mut();
            query.append_pair("limit", &PAGE_LIMIT.to_string());
            if let Some(max_id) = max_id {
                query.append_pair("max_id", max_id);
            }
        }

        let response = self
            .http
            .get(endpoint)
            .bearer_auth(&auth.access_token)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let next_max_id = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_max_id);

        let statuses: Vec<Status> = response
            .json()
            .await
            .map_err(|e| FetchError::Deserialize(e.to_string()))?;

        Ok(BookmarkPage {
            statuses,
            next_max_id,
        })
    }
}

impl Default for MastodonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BookmarkSource for MastodonClient {
    fn fetch_bookmarks(
        &self,
        max_id: Option<&str>,
        auth: &AuthContext,
    ) -> impl Future<Output = Result<BookmarkPage, FetchError>> + Send {
        self.get_bookmarks(max_id, auth)
    }
}

/// Extract the `max_id` continuation token from a `Link` header.
///
/// Header shape: `<https://…/bookmarks?max_id=123>; rel="next",
/// <https://…/bookmarks?min_id=456>; rel="prev"`. A header without a usable
/// `rel="next"` target means the list is exhausted.
fn parse_next_max_id(header: &str) -> Option<String> {
    for part in header.split(',') {
        if !part.contains("rel=\"next\"") {
            continue;
        }
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        let target = url::Url::parse(part.get(start..end)?).ok()?;
        return target
            .query_pairs()
            .find(|(key, _)| key == "max_id")
            .map(|(_, value)| value.into_owned());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_header_with_next_and_prev() {
        let header = "<https://example.social/api/v1/bookmarks?max_id=103>; rel=\"next\", \
                      <https://example.social/api/v1/bookmarks?min_id=120>; rel=\"prev\"";
        assert_eq!(parse_next_max_id(header), Some("103".to_string()));
    }

    #[test]
    fn test_link_header_prev_only() {
        let header = "<https://example.social/api/v1/bookmarks?min_id=120>; rel=\"prev\"";
        assert_eq!(parse_next_max_id(header), None);
    }

    #[test]
    fn test_link_header_next_without_max_id() {
        let header = "<https://example.social/api/v1/bookmarks?limit=40>; rel=\"next\"";
        assert_eq!(parse_next_max_id(header), None);
    }

    #[test]
    fn test_link_header_empty() {
        assert_eq!(parse_next_max_id(""), None);
    }

    #[test]
    fn test_link_header_malformed_url() {
        let header = "<not a url>; rel=\"next\"";
        assert_eq!(parse_next_max_id(header), None);
    }

    #[test]
    fn test_link_header_preserves_opaque_token() {
        let header = "<https://example.social/api/v1/bookmarks?max_id=110424%3Aabc>; rel=\"next\"";
        assert_eq!(parse_next_max_id(header), Some("110424:abc".to_string()));
    }
}
