//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: the four per-period collections
    r#"
    CREATE TABLE IF NOT EXISTS ga_url (
        id                  TEXT PRIMARY KEY,
        period_name         TEXT NOT NULL,
        period_complete_day INTEGER NOT NULL DEFAULT 0,
        url                 TEXT NOT NULL,
        pageviews           INTEGER NOT NULL DEFAULT 0 CHECK (pageviews >= 0),
        visits              INTEGER NOT NULL DEFAULT 0 CHECK (visits >= 0),
        department_id       TEXT,
        package_id          TEXT
    );

    CREATE TABLE IF NOT EXISTS ga_stat (
        id               TEXT PRIMARY KEY,
        period_name      TEXT NOT NULL,
        stat_name        TEXT NOT NULL,
        key              TEXT NOT NULL,
        value            TEXT
    );

    CREATE TABLE IF NOT EXISTS ga_publisher (
        id                TEXT PRIMARY KEY,
        period_name       TEXT NOT NULL,
        publisher_name    TEXT NOT NULL,
        views             INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
        visits            INTEGER NOT NULL DEFAULT 0 CHECK (visits >= 0),
        toplevel          INTEGER NOT NULL DEFAULT 0,
        subpublishercount INTEGER NOT NULL DEFAULT 0,
        parent            TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS ga_referrer (
        id               TEXT PRIMARY KEY,
        period_name      TEXT NOT NULL,
        source           TEXT NOT NULL,
        url              TEXT NOT NULL,
        count            INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0)
    );

    -- Natural keys
    CREATE UNIQUE INDEX IF NOT EXISTS uq_ga_url_period_url ON ga_url(period_name, url);
    CREATE UNIQUE INDEX IF NOT EXISTS uq_ga_stat_key ON ga_stat(period_name, stat_name, key);
    CREATE UNIQUE INDEX IF NOT EXISTS uq_ga_publisher_name ON ga_publisher(period_name, publisher_name);
    CREATE UNIQUE INDEX IF NOT EXISTS uq_ga_referrer_key ON ga_referrer(period_name, source, url);
    "#,
    // Version 2: rollup lookups by department and cumulative lookups by url
    r#"
    CREATE INDEX IF NOT EXISTS idx_ga_url_department ON ga_url(period_name, department_id);
    CREATE INDEX IF NOT EXISTS idx_ga_url_url ON ga_url(url);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
