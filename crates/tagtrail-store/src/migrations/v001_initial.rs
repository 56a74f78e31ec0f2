//! v001 -- Initial schema creation.
//!
//! Creates the three tables: `trackers`, `owner_trackers` and `reports`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Trackers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS trackers (
    advertisement_key TEXT PRIMARY KEY NOT NULL,  -- base64 wire identifier
    last_fetch_time   TEXT,                       -- RFC-3339 UTC, NULL = never fetched
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trackers_last_fetch ON trackers(last_fetch_time);

-- ----------------------------------------------------------------
-- Owner links (opaque owner-encrypted private data)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS owner_trackers (
    id                     TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    owner_id               TEXT NOT NULL,              -- UUID of the owning user
    advertisement_key      TEXT NOT NULL,              -- FK -> trackers
    encrypted_private_data TEXT NOT NULL,
    created_at             TEXT NOT NULL,

    FOREIGN KEY (advertisement_key) REFERENCES trackers(advertisement_key) ON DELETE CASCADE,
    UNIQUE (owner_id, advertisement_key)
);

CREATE INDEX IF NOT EXISTS idx_owner_trackers_owner ON owner_trackers(owner_id);
CREATE INDEX IF NOT EXISTS idx_owner_trackers_key ON owner_trackers(advertisement_key);

-- ----------------------------------------------------------------
-- Reports (ciphertext as delivered by the report network)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reports (
    id                TEXT PRIMARY KEY NOT NULL,  -- content-addressed UUID
    advertisement_key TEXT NOT NULL,              -- FK -> trackers
    time              TEXT NOT NULL,              -- published time, RFC-3339 UTC
    payload           TEXT NOT NULL,              -- base64 ciphertext

    FOREIGN KEY (advertisement_key) REFERENCES trackers(advertisement_key) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reports_tracker_time
    ON reports(advertisement_key, time DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
