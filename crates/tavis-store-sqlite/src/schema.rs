//! SQL schema for the Tavis SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The full record is stored as JSON; the extra columns exist only for
-- lookup and stay in sync with the payload on every upsert.
CREATE TABLE IF NOT EXISTS customers (
    customer_id     TEXT PRIMARY KEY,
    external_id     TEXT,
    conversation_id TEXT,
    record_json     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    conversation_id  TEXT PRIMARY KEY,
    participant_id   TEXT NOT NULL,
    participant_name TEXT,
    last_message_at  TEXT,            -- ISO 8601 UTC
    agent            TEXT
);

-- Messages are immutable after first write.
-- Repeated upserts with a seen message_id are no-ops (INSERT OR IGNORE).
CREATE TABLE IF NOT EXISTS messages (
    message_id      TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
    from_id         TEXT NOT NULL,
    from_name       TEXT,
    content         TEXT,
    attachment_json TEXT,             -- JSON-encoded Attachment or NULL
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS customers_external_idx     ON customers(external_id);
CREATE INDEX IF NOT EXISTS customers_conversation_idx ON customers(conversation_id);
CREATE INDEX IF NOT EXISTS messages_conversation_idx  ON messages(conversation_id, created_at DESC);

PRAGMA user_version = 1;
";
