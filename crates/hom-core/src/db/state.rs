//! Persisted app state: the record counter and export bookkeeping.
//!
//! State lives in the `app_state` key/value table so it travels with the
//! database file. There is no ambient global; callers read snapshots
//! through [`Database::export_state`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::{Database, DbError, DbResult};

pub(super) const STATE_TOTAL_RECORDS: &str = "total_records";
pub(super) const STATE_LATEST_ENTRY: &str = "latest_entry";
pub(super) const STATE_EXPORT_FILENAME: &str = "export_filename";
pub(super) const STATE_DIRTY: &str = "dirty";
pub(super) const STATE_WRITE_EPOCH: &str = "write_epoch";

/// Snapshot of the persisted export and bookkeeping state.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportState {
    /// Name of the current export file, if one has been generated.
    pub export_filename: Option<String>,
    /// True when any record changed since the last export.
    pub dirty: bool,
    /// Running total of records ever created; also the id counter.
    /// Soft deletes do not decrement it; only a full wipe resets it.
    pub total_records: i64,
    /// When the most recent record was added (not edited).
    pub latest_entry: Option<DateTime<Utc>>,
    /// Bumped by every mutation; lets the export engine detect writes
    /// that land while a file is being generated.
    pub write_epoch: i64,
}

impl Database {
    /// Get a raw state value.
    pub fn state_value(&self, key: &str) -> DbResult<Option<String>> {
        read_state(&self.conn, key)
    }

    /// Set a raw state value.
    pub fn set_state_value(&self, key: &str, value: &str) -> DbResult<()> {
        write_state(&self.conn, key, value)
    }

    /// Read the full persisted state snapshot.
    pub fn export_state(&self) -> DbResult<ExportState> {
        let filename = read_required(&self.conn, STATE_EXPORT_FILENAME)?;
        let dirty = read_required(&self.conn, STATE_DIRTY)? == "1";
        let total_records = read_i64(&self.conn, STATE_TOTAL_RECORDS)?;
        let latest_raw = read_required(&self.conn, STATE_LATEST_ENTRY)?;
        let latest_entry = if latest_raw.is_empty() {
            None
        } else {
            Some(parse_timestamp(STATE_LATEST_ENTRY, &latest_raw)?)
        };
        let write_epoch = read_i64(&self.conn, STATE_WRITE_EPOCH)?;

        Ok(ExportState {
            export_filename: if filename.is_empty() {
                None
            } else {
                Some(filename)
            },
            dirty,
            total_records,
            latest_entry,
            write_epoch,
        })
    }

    /// Whether the dataset changed since the last export.
    pub fn is_dirty(&self) -> DbResult<bool> {
        Ok(read_required(&self.conn, STATE_DIRTY)? == "1")
    }

    /// Total records ever created (the id counter).
    pub fn total_records(&self) -> DbResult<i64> {
        read_i64(&self.conn, STATE_TOTAL_RECORDS)
    }

    /// Current write epoch.
    pub fn write_epoch(&self) -> DbResult<i64> {
        read_i64(&self.conn, STATE_WRITE_EPOCH)
    }

    /// Record the export filename after a completed generation.
    ///
    /// Clears the dirty flag only if no write landed since
    /// `observed_epoch` was read; a mid-export write keeps the dataset
    /// dirty so the next export regenerates. Returns whether the flag
    /// was cleared.
    pub(crate) fn finish_export(&mut self, filename: &str, observed_epoch: i64) -> DbResult<bool> {
        let tx = self.conn.transaction()?;
        write_state(&tx, STATE_EXPORT_FILENAME, filename)?;
        let clean = read_i64(&tx, STATE_WRITE_EPOCH)? == observed_epoch;
        if clean {
            write_state(&tx, STATE_DIRTY, "0")?;
        }
        tx.commit()?;
        Ok(clean)
    }

    /// Record a new export filename without touching the dirty flag
    /// (rename path; the file content is unchanged).
    pub(crate) fn set_export_filename(&self, filename: &str) -> DbResult<()> {
        write_state(&self.conn, STATE_EXPORT_FILENAME, filename)
    }
}

pub(super) fn read_state(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    conn.query_row("SELECT value FROM app_state WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(Into::into)
}

pub(super) fn write_state(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO app_state (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        [key, value],
    )?;
    Ok(())
}

/// Mark the dataset changed: set the dirty flag and bump the epoch.
pub(super) fn mark_dirty(conn: &Connection) -> DbResult<()> {
    write_state(conn, STATE_DIRTY, "1")?;
    conn.execute(
        "UPDATE app_state SET value = CAST(value AS INTEGER) + 1, updated_at = datetime('now') \
         WHERE key = ?",
        [STATE_WRITE_EPOCH],
    )?;
    Ok(())
}

pub(super) fn read_required(conn: &Connection, key: &str) -> DbResult<String> {
    read_state(conn, key)?.ok_or_else(|| DbError::Corrupt(format!("state key `{key}` missing")))
}

pub(super) fn read_i64(conn: &Connection, key: &str) -> DbResult<i64> {
    let raw = read_required(conn, key)?;
    raw.parse()
        .map_err(|_| DbError::Corrupt(format!("state key `{key}`: invalid integer `{raw}`")))
}

fn parse_timestamp(key: &str, raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::Corrupt(format!("state key `{key}`: bad timestamp `{raw}`")))
}
