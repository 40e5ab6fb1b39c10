// SPDX-License-Identifier: MPL-2.0

mod client;
mod fetch;
mod types;

pub use client::MastodonClient;
pub use fetch::{BookmarkPage, BookmarkSource, FetchError};
pub use types::{
    Account, Application, CustomEmoji, MediaAttachment, Mention, Status, Tag,
};
