// SPDX-License-Identifier: MPL-2.0

//! Local data and state layer for a native Mastodon client.
//!
//! Three pieces:
//! - [`store`]: a SQLite-backed object graph mirroring remote posts and
//!   accounts, deduplicated on a `(domain, remote_id)` composite identity.
//! - [`store::merge`]: the upsert engine that reconciles freshly fetched
//!   server representations against the local graph, transactionally.
//! - [`state`]: per-screen pagination state machines that drive paged
//!   fetches into the graph and publish an ordered, duplicate-free id list
//!   for a list view to render.
//!
//! UI rendering, credential storage, and everything below the bookmark
//! endpoint are collaborators behind narrow traits; this crate only owns
//! the data.

pub mod config;
pub mod mastodon;
pub mod runtime;
pub mod state;
pub mod store;
