// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "io.github.roostclient.Roost";
pub const APP_NAME: &str = "Roost";

/// Instance domain used when the host has not picked one yet.
pub const DEFAULT_INSTANCE: &str = "mastodon.social";

/// Page size requested from paged endpoints.
pub const PAGE_LIMIT: u32 = 40;
