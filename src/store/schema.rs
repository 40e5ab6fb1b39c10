// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the local object graph
pub const SCHEMA: &str = r#"
-- Database version for migrations
PRAGMA user_version = 1;

-- accounts: composite identity (domain, remote_id), identifier = remote_id@domain
CREATE TABLE IF NOT EXISTS accounts (
    identifier TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    username TEXT NOT NULL,
    acct TEXT NOT NULL,
    display_name TEXT,
    url TEXT,
    avatar TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(domain, remote_id)
);

CREATE INDEX IF NOT EXISTS idx_accounts_domain ON accounts(domain);

-- posts: canonical records for remote statuses
-- Scalar columns are immutable on create except the counters, pinned_by,
-- updated_at and deleted_at.
CREATE TABLE IF NOT EXISTS posts (
    identifier TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    uri TEXT NOT NULL,
    created_at TEXT NOT NULL,
    content TEXT NOT NULL,
    visibility TEXT,
    sensitive INTEGER NOT NULL DEFAULT 0,
    spoiler_text TEXT,
    application_json TEXT,
    reblogs_count INTEGER NOT NULL DEFAULT 0,
    favourites_count INTEGER NOT NULL DEFAULT 0,
    replies_count INTEGER,
    url TEXT,
    in_reply_to_id TEXT,
    in_reply_to_account_id TEXT,
    language TEXT,
    text TEXT,
    author_identifier TEXT NOT NULL REFERENCES accounts(identifier),
    reblog_identifier TEXT REFERENCES posts(identifier),
    -- The pinning account is the viewer; it is not required to exist as an
    -- accounts row.
    pinned_by_identifier TEXT,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE(domain, remote_id)
);

CREATE INDEX IF NOT EXISTS idx_posts_domain ON posts(domain);
CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_identifier);

-- post_actors: "account did X to post" relation sets
-- kind is one of favourite | reblog | mute | bookmark
-- account_identifier is deliberately not a foreign key: viewer identities
-- come from the session layer and need not be persisted accounts.
CREATE TABLE IF NOT EXISTS post_actors (
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    account_identifier TEXT NOT NULL,
    kind TEXT NOT NULL,
    UNIQUE(post_identifier, account_identifier, kind)
);

CREATE INDEX IF NOT EXISTS idx_post_actors_post ON post_actors(post_identifier, kind);

-- Owned children. Rows live and die with their post.
CREATE TABLE IF NOT EXISTS mentions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    account_remote_id TEXT NOT NULL,
    username TEXT NOT NULL,
    acct TEXT NOT NULL,
    url TEXT
);

CREATE INDEX IF NOT EXISTS idx_mentions_post ON mentions(post_identifier);

CREATE TABLE IF NOT EXISTS emojis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    shortcode TEXT NOT NULL,
    url TEXT NOT NULL,
    static_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_emojis_post ON emojis(post_identifier);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    name TEXT NOT NULL,
    url TEXT
);

CREATE INDEX IF NOT EXISTS idx_tags_post ON tags(post_identifier);

CREATE TABLE IF NOT EXISTS media_attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    remote_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    url TEXT,
    preview_url TEXT,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_media_post ON media_attachments(post_identifier);

-- timeline_items: denormalized placement records for an account's home
-- timeline ordering
CREATE TABLE IF NOT EXISTS timeline_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_identifier TEXT NOT NULL REFERENCES accounts(identifier),
    post_identifier TEXT NOT NULL REFERENCES posts(identifier),
    sort_at TEXT NOT NULL,
    UNIQUE(owner_identifier, post_identifier)
);

CREATE INDEX IF NOT EXISTS idx_timeline_owner ON timeline_items(owner_identifier, sort_at DESC);
"#;
