//! Database schema definitions
//!
//! Snapshot tables are append-only; the newest row per key is the current
//! state and older rows are the history.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    source_name TEXT NOT NULL,
    phase TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    processed_items INTEGER NOT NULL DEFAULT 0
);

-- Product identifiers found by listing discovery
CREATE TABLE IF NOT EXISTS discovered_products (
    product_id TEXT PRIMARY KEY,
    brand_id TEXT,
    first_session TEXT NOT NULL REFERENCES sessions(id),
    last_session TEXT NOT NULL REFERENCES sessions(id),
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_discovered_brand ON discovered_products(brand_id);

-- Home payload history
CREATE TABLE IF NOT EXISTS home_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    source_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_home_source ON home_snapshots(source_name);

-- Product payload history
CREATE TABLE IF NOT EXISTS product_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    product_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_product_snapshots_product ON product_snapshots(product_id);

-- Review page history
CREATE TABLE IF NOT EXISTS review_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    snapshot_id INTEGER NOT NULL REFERENCES product_snapshots(id),
    product_id TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    payload TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_pages_key ON review_pages(product_id, page_number);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('sessions', 'discovered_products', 'home_snapshots', 'product_snapshots', 'review_pages')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
    }
}
