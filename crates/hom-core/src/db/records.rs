//! Visit record CRUD and queries.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, OptionalExtension, Row};

use super::state::{
    mark_dirty, read_i64, write_state, STATE_LATEST_ENTRY, STATE_TOTAL_RECORDS,
};
use super::{Database, DbError, DbResult};
use crate::cancel::CancelFlag;
use crate::models::{PatientRecord, Prescription, RecordDraft, Sex};

/// Rows deleted per chunk during a full wipe.
const CLEAR_CHUNK: usize = 500;

const RECORD_COLUMNS: &str =
    "id, clinic, sex, age, creation, diagnoses, prescriptions, notes, deleted, search_digest";

/// Sort orders for record queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// Most recent visit first (the list screen default).
    #[default]
    NewestFirst,
    OldestFirst,
    /// Stable id order; exports read in `IdAscending`.
    IdAscending,
    IdDescending,
}

impl RecordOrder {
    fn sql(&self) -> &'static str {
        // Ties on creation break by id so ordering is total
        match self {
            RecordOrder::NewestFirst => "creation DESC, id DESC",
            RecordOrder::OldestFirst => "creation ASC, id ASC",
            RecordOrder::IdAscending => "id ASC",
            RecordOrder::IdDescending => "id DESC",
        }
    }
}

/// Query over stored records. Restartable: every call re-evaluates
/// against the current store state.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub order: RecordOrder,
    /// Case-insensitive term matched against clinic (substring), sex
    /// (prefix), age (prefix) and the diagnosis/medicine digest
    /// (substring).
    pub search: Option<String>,
    /// Soft-deleted rows are hidden unless set; the export path sets it.
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Raw row shape before validation.
struct RecordRow {
    id: i64,
    clinic: String,
    sex: String,
    age: i64,
    creation: String,
    diagnoses: String,
    prescriptions: String,
    notes: String,
    deleted: bool,
    search_digest: String,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        clinic: row.get(1)?,
        sex: row.get(2)?,
        age: row.get(3)?,
        creation: row.get(4)?,
        diagnoses: row.get(5)?,
        prescriptions: row.get(6)?,
        notes: row.get(7)?,
        deleted: row.get(8)?,
        search_digest: row.get(9)?,
    })
}

impl TryFrom<RecordRow> for PatientRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, DbError> {
        let sex = Sex::parse(&row.sex).ok_or_else(|| {
            DbError::Corrupt(format!("record {}: unrecognized sex `{}`", row.id, row.sex))
        })?;
        let age = u32::try_from(row.age).map_err(|_| {
            DbError::Corrupt(format!("record {}: negative age {}", row.id, row.age))
        })?;
        let creation = DateTime::parse_from_rfc3339(&row.creation)
            .map_err(|_| {
                DbError::Corrupt(format!(
                    "record {}: bad creation timestamp `{}`",
                    row.id, row.creation
                ))
            })?
            .with_timezone(&Utc);
        let diagnoses: Vec<String> = serde_json::from_str(&row.diagnoses)?;
        let prescriptions: Vec<Prescription> = serde_json::from_str(&row.prescriptions)?;

        Ok(PatientRecord {
            id: row.id,
            clinic: row.clinic,
            sex,
            age,
            creation,
            diagnoses,
            prescriptions,
            notes: row.notes,
            deleted: row.deleted,
            search_digest: row.search_digest,
        })
    }
}

impl Database {
    /// Create a record from a draft.
    ///
    /// Assigns the next id from the persisted counter, stamps the
    /// creation time, and marks the dataset changed, all in one
    /// transaction.
    pub fn create_record(&mut self, draft: RecordDraft) -> DbResult<PatientRecord> {
        let tx = self.conn.transaction()?;

        let id = read_i64(&tx, STATE_TOTAL_RECORDS)? + 1;
        let now = Utc::now();
        let search_digest = draft.search_digest();
        let record = PatientRecord {
            id,
            clinic: draft.clinic,
            sex: draft.sex,
            age: draft.age,
            creation: now,
            diagnoses: draft.diagnoses,
            prescriptions: draft.prescriptions,
            notes: draft.notes,
            deleted: false,
            search_digest,
        };

        tx.execute(
            "INSERT INTO patients (id, clinic, sex, age, creation, diagnoses, prescriptions, \
             notes, deleted, search_digest) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.clinic,
                record.sex.as_str(),
                record.age,
                record.creation.to_rfc3339(),
                serde_json::to_string(&record.diagnoses)?,
                serde_json::to_string(&record.prescriptions)?,
                record.notes,
                record.deleted,
                record.search_digest,
            ],
        )?;
        write_state(&tx, STATE_TOTAL_RECORDS, &id.to_string())?;
        write_state(&tx, STATE_LATEST_ENTRY, &now.to_rfc3339())?;
        mark_dirty(&tx)?;

        tx.commit()?;
        info!("created record {}", record.id);
        Ok(record)
    }

    /// Update the caller-editable fields of an existing record.
    ///
    /// `id`, `creation` and the deleted flag are preserved; the search
    /// digest is recomputed. Fails with [`DbError::NotFound`] when no
    /// record has this id.
    pub fn update_record(&mut self, id: i64, draft: &RecordDraft) -> DbResult<()> {
        let tx = self.conn.transaction()?;

        let rows = tx.execute(
            "UPDATE patients SET clinic = ?2, sex = ?3, age = ?4, diagnoses = ?5, \
             prescriptions = ?6, notes = ?7, search_digest = ?8 WHERE id = ?1",
            params![
                id,
                draft.clinic,
                draft.sex.as_str(),
                draft.age,
                serde_json::to_string(&draft.diagnoses)?,
                serde_json::to_string(&draft.prescriptions)?,
                draft.notes,
                draft.search_digest(),
            ],
        )?;
        if rows == 0 {
            return Err(DbError::NotFound(id));
        }
        mark_dirty(&tx)?;

        tx.commit()?;
        debug!("updated record {}", id);
        Ok(())
    }

    /// Soft-delete a record.
    ///
    /// Idempotent: deleting an already-deleted record is a no-op and does
    /// not mark the dataset changed. An unknown id is an error.
    pub fn soft_delete_record(&mut self, id: i64) -> DbResult<()> {
        let tx = self.conn.transaction()?;

        let deleted: Option<bool> = tx
            .query_row("SELECT deleted FROM patients WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;
        match deleted {
            None => Err(DbError::NotFound(id)),
            Some(true) => Ok(()),
            Some(false) => {
                tx.execute("UPDATE patients SET deleted = 1 WHERE id = ?", [id])?;
                mark_dirty(&tx)?;
                tx.commit()?;
                info!("soft-deleted record {}", id);
                Ok(())
            }
        }
    }

    /// Fetch a single record by id.
    pub fn record(&self, id: i64) -> DbResult<Option<PatientRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM patients WHERE id = ?"),
                [id],
                map_row,
            )
            .optional()?;
        row.map(PatientRecord::try_from).transpose()
    }

    /// Query records with ordering, search, and pagination.
    pub fn query_records(&self, query: &RecordQuery) -> DbResult<Vec<PatientRecord>> {
        let (sql, bindings) = build_query_sql(query);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bindings.iter()), map_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(PatientRecord::try_from(row?)?);
        }
        Ok(records)
    }

    /// Iterate matching records in pages of `batch_size`.
    ///
    /// Exports stream through this so memory stays bounded regardless of
    /// dataset size.
    pub fn record_batches(&self, query: RecordQuery, batch_size: u32) -> RecordBatches<'_> {
        RecordBatches {
            db: self,
            query,
            batch_size: batch_size.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Physically remove every record and reset the id counter.
    ///
    /// Deletes in chunks inside a single transaction, checking `cancel`
    /// between chunks; cancellation rolls the whole wipe back. Returns
    /// the number of rows removed.
    pub fn clear_all(&mut self, cancel: &CancelFlag) -> DbResult<u64> {
        let tx = self.conn.transaction()?;

        let mut removed: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!("wipe cancelled after {} rows; rolling back", removed);
                return Err(DbError::Cancelled);
            }
            let chunk = tx.execute(
                "DELETE FROM patients WHERE id IN (SELECT id FROM patients LIMIT ?)",
                params![CLEAR_CHUNK as i64],
            )?;
            removed += chunk as u64;
            if chunk < CLEAR_CHUNK {
                break;
            }
        }
        write_state(&tx, STATE_TOTAL_RECORDS, "0")?;
        write_state(&tx, STATE_LATEST_ENTRY, "")?;
        mark_dirty(&tx)?;

        tx.commit()?;
        info!("cleared all records ({} removed)", removed);
        Ok(removed)
    }
}

fn build_query_sql(query: &RecordQuery) -> (String, Vec<String>) {
    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM patients");
    let mut clauses: Vec<String> = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if !query.include_deleted {
        clauses.push("deleted = 0".into());
    }
    if let Some(term) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let escaped = escape_like(term);
        clauses.push(
            concat!(
                r"(clinic LIKE ? ESCAPE '\' OR sex LIKE ? ESCAPE '\'",
                r" OR CAST(age AS TEXT) LIKE ? ESCAPE '\' OR search_digest LIKE ? ESCAPE '\')",
            )
            .into(),
        );
        bindings.push(format!("%{escaped}%"));
        bindings.push(format!("{escaped}%"));
        bindings.push(format!("{escaped}%"));
        bindings.push(format!("%{escaped}%"));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    sql.push_str(query.order.sql());

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    } else if let Some(offset) = query.offset {
        // SQLite requires a LIMIT clause for OFFSET to apply
        sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
    }

    (sql, bindings)
}

/// Escape LIKE wildcards in a user-supplied search term.
fn escape_like(term: &str) -> String {
    term.replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_")
}

/// Iterator over query pages. Yields non-empty batches in query order.
pub struct RecordBatches<'a> {
    db: &'a Database,
    query: RecordQuery,
    batch_size: u32,
    offset: u32,
    done: bool,
}

impl Iterator for RecordBatches<'_> {
    type Item = DbResult<Vec<PatientRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut page = self.query.clone();
        page.limit = Some(self.batch_size);
        page.offset = Some(self.offset);

        match self.db.query_records(&page) {
            Ok(batch) => {
                if batch.is_empty() {
                    self.done = true;
                    return None;
                }
                if (batch.len() as u32) < self.batch_size {
                    self.done = true;
                }
                self.offset += batch.len() as u32;
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn make_draft(clinic: &str, sex: Sex, age: u32) -> RecordDraft {
        RecordDraft {
            clinic: clinic.into(),
            sex,
            age,
            diagnoses: vec!["GERD".into()],
            prescriptions: vec![Prescription {
                medicine: "Tylenol".into(),
                dosage: "BD".into(),
                quantity: 7,
            }],
            notes: String::new(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let mut db = setup_db();

        let record = db.create_record(make_draft("Marigot", Sex::Male, 34)).unwrap();
        assert_eq!(record.id, 1);
        assert!(!record.deleted);
        assert_eq!(record.search_digest, "GERD Tylenol");

        let fetched = db.record(1).unwrap().unwrap();
        assert_eq!(fetched, record);
        assert_eq!(db.record(2).unwrap(), None);
    }

    #[test]
    fn test_create_marks_dirty_and_counts() {
        let mut db = setup_db();
        assert!(!db.is_dirty().unwrap());

        db.create_record(make_draft("Marigot", Sex::Male, 34)).unwrap();

        assert!(db.is_dirty().unwrap());
        assert_eq!(db.total_records().unwrap(), 1);
        assert_eq!(db.write_epoch().unwrap(), 1);
        assert!(db.export_state().unwrap().latest_entry.is_some());
    }

    #[test]
    fn test_update_preserves_creation_and_id() {
        let mut db = setup_db();
        let record = db.create_record(make_draft("Marigot", Sex::Male, 34)).unwrap();

        let mut draft = make_draft("Dabon", Sex::Male, 35);
        draft.diagnoses = vec!["HTN".into()];
        db.update_record(record.id, &draft).unwrap();

        let updated = db.record(record.id).unwrap().unwrap();
        assert_eq!(updated.clinic, "Dabon");
        assert_eq!(updated.age, 35);
        assert_eq!(updated.creation, record.creation);
        assert_eq!(updated.search_digest, "HTN Tylenol");
    }

    #[test]
    fn test_update_unknown_id() {
        let mut db = setup_db();
        let err = db.update_record(99, &make_draft("Marigot", Sex::Male, 34)).unwrap_err();
        assert!(matches!(err, DbError::NotFound(99)));
    }

    #[test]
    fn test_second_soft_delete_is_silent() {
        let mut db = setup_db();
        let record = db.create_record(make_draft("Marigot", Sex::Male, 34)).unwrap();

        db.soft_delete_record(record.id).unwrap();
        let epoch = db.write_epoch().unwrap();

        // A repeat delete succeeds but changes nothing
        db.soft_delete_record(record.id).unwrap();
        assert_eq!(db.write_epoch().unwrap(), epoch);

        let err = db.soft_delete_record(42).unwrap_err();
        assert!(matches!(err, DbError::NotFound(42)));
    }

    #[test]
    fn test_corrupt_sex_surfaces() {
        let mut db = setup_db();
        let record = db.create_record(make_draft("Marigot", Sex::Male, 34)).unwrap();

        db.conn()
            .execute("UPDATE patients SET sex = 'Unknown' WHERE id = ?", [record.id])
            .unwrap();

        let err = db.record(record.id).unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%"), r"50\%");
        assert_eq!(escape_like("a_b"), r"a\_b");
        assert_eq!(escape_like(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn test_batches_empty_store() {
        let db = setup_db();
        let query = RecordQuery {
            include_deleted: true,
            ..RecordQuery::default()
        };
        assert_eq!(db.record_batches(query, 10).count(), 0);
    }
}
