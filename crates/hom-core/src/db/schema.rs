//! SQLite schema definition.

/// Complete database schema for the visit log.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patient visit records
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY,                      -- assigned from app_state counter
    clinic TEXT NOT NULL,
    sex TEXT NOT NULL,
    age INTEGER NOT NULL,
    creation TEXT NOT NULL,                      -- RFC 3339
    diagnoses TEXT NOT NULL DEFAULT '[]',        -- JSON array of strings
    prescriptions TEXT NOT NULL DEFAULT '[]',    -- JSON array of {medicine, dosage, quantity}
    notes TEXT NOT NULL DEFAULT '',
    deleted INTEGER NOT NULL DEFAULT 0,
    search_digest TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_patients_creation ON patients(creation);
CREATE INDEX IF NOT EXISTS idx_patients_deleted ON patients(deleted);

-- ============================================================================
-- App State
-- ============================================================================

CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Record counter, export bookkeeping and the write epoch
INSERT OR IGNORE INTO app_state (key, value) VALUES ('total_records', '0');
INSERT OR IGNORE INTO app_state (key, value) VALUES ('latest_entry', '');
INSERT OR IGNORE INTO app_state (key, value) VALUES ('export_filename', '');
INSERT OR IGNORE INTO app_state (key, value) VALUES ('dirty', '0');
INSERT OR IGNORE INTO app_state (key, value) VALUES ('write_epoch', '0');
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_state_defaults_seeded() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM app_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 5);

        let counter: String = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = 'total_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(counter, "0");
    }

    #[test]
    fn test_schema_reapply_keeps_state() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "UPDATE app_state SET value = '7' WHERE key = 'total_records'",
            [],
        )
        .unwrap();

        // Re-running the schema must not clobber live values
        conn.execute_batch(SCHEMA).unwrap();

        let counter: String = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = 'total_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(counter, "7");
    }
}
