//! Database schema and first-run seeding.

use rusqlite::Connection;

/// Full schema. The embeddings table replaces the parallel
/// vectors/names files of older deployments: one row is one
/// (vector, name) pair, so the pairing invariant holds structurally and
/// rowid order preserves first-seen matching order.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id          INTEGER PRIMARY KEY,
    identity_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    source_path TEXT NOT NULL,
    vector      BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_identity ON embeddings (identity_id);

CREATE TABLE IF NOT EXISTS processed_paths (
    path        TEXT PRIMARY KEY,
    identity_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS roster (
    identity_id  TEXT PRIMARY KEY,
    display_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shifts (
    id                     INTEGER PRIMARY KEY,
    name                   TEXT NOT NULL,
    start_time             TEXT NOT NULL,
    end_time               TEXT NOT NULL,
    late_grace_minutes     INTEGER NOT NULL,
    half_day_late_minutes  INTEGER NOT NULL,
    early_half_day_minutes INTEGER NOT NULL,
    overtime_start_minutes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance_log (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id             TEXT NOT NULL,
    display_name            TEXT NOT NULL,
    device_id               TEXT NOT NULL,
    punch_time              TEXT NOT NULL,
    punch_date              TEXT NOT NULL,
    punch_clock             TEXT NOT NULL,
    punch_type              TEXT NOT NULL,
    shift_id                INTEGER NOT NULL,
    status                  TEXT NOT NULL,
    late_minutes            INTEGER NOT NULL DEFAULT 0,
    early_departure_minutes INTEGER NOT NULL DEFAULT 0,
    overtime_minutes        INTEGER NOT NULL DEFAULT 0,
    confidence              REAL NOT NULL,
    synced                  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_attendance_identity_date
    ON attendance_log (identity_id, punch_date);
CREATE INDEX IF NOT EXISTS idx_attendance_unsynced
    ON attendance_log (synced, id);
"#;

/// Create tables and seed the default "General" shift. Idempotent.
pub fn initialize(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO shifts
            (id, name, start_time, end_time, late_grace_minutes,
             half_day_late_minutes, early_half_day_minutes, overtime_start_minutes)
         VALUES (1, 'General', '09:00:00', '18:00:00', 15, 120, 60, 30)",
        [],
    )?;
    Ok(())
}
