//! Heart-of-Medicine Core Library
//!
//! Local-first patient visit log for single-clinic and field-medicine use.
//!
//! # Architecture
//!
//! ```text
//! Intake form → RecordDraft → Record Store (SQLite)
//!                                   │
//!                           [dirty flag + write epoch]
//!                                   │
//!                             Export Engine
//!                                   │
//!                         one CSV snapshot on disk
//!                                   │
//!                              share target
//! ```
//!
//! # Core Principle
//!
//! **Records are never silently lost.** Deleting a visit only flags it;
//! soft-deleted rows stay out of the list but remain in the store and in
//! every export, marked in the `Deleted` column. Only the explicit
//! clear-all wipe removes data, and ids are never reused.
//!
//! # Modules
//!
//! - [`db`]: SQLite record store and persisted export state
//! - [`models`]: Domain types (PatientRecord, Prescription, RecordDraft)
//! - [`export`]: CSV rendering and export file lifecycle
//! - [`catalog`]: Form option lists and medication suggestions
//! - [`logging`]: File logging bootstrap for the host app
//! - [`cancel`]: Cooperative cancellation for long operations

pub mod cancel;
pub mod catalog;
pub mod db;
pub mod export;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use db::{Database, DbError, ExportState, RecordOrder, RecordQuery};
pub use export::{CsvExporter, ExportAction, ExportError, ExportOutcome, ExportRequest};
pub use models::{PatientRecord, Prescription, RecordDraft, Sex};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum HomError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid record data: {0}")]
    InvalidData(String),

    #[error("File error: {0}")]
    FileError(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<DbError> for HomError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(id) => HomError::NotFound(format!("record {id}")),
            DbError::Corrupt(detail) => HomError::InvalidData(detail),
            DbError::Cancelled => HomError::Cancelled,
            other => HomError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ExportError> for HomError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Store(db) => db.into(),
            ExportError::Validation(detail) => HomError::InvalidData(detail),
            ExportError::File(io) => HomError::FileError(io.to_string()),
            ExportError::InvalidFilename(name) => {
                HomError::InvalidInput(format!("export filename `{name}`"))
            }
            ExportError::Cancelled => HomError::Cancelled,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for HomError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        HomError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create the visit store at the given database path, with
/// exports written to `export_dir`.
#[uniffi::export]
pub fn open_store(db_path: String, export_dir: String) -> Result<Arc<HomCore>, HomError> {
    let db = Database::open(&db_path)?;
    Ok(Arc::new(HomCore::wrap(db, export_dir)))
}

/// Create an in-memory store (for testing).
#[uniffi::export]
pub fn open_store_in_memory(export_dir: String) -> Result<Arc<HomCore>, HomError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(HomCore::wrap(db, export_dir)))
}

/// Start file logging for the host app.
#[uniffi::export]
pub fn init_logging(level: String, log_dir: String) -> Result<(), HomError> {
    logging::init_logging(&level, &log_dir).map_err(HomError::InvalidInput)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe store wrapper for FFI.
///
/// The mutex serializes every store and export operation across FFI
/// threads; the cancel flag lives outside the lock so the UI thread can
/// abort a running export or wipe.
#[derive(uniffi::Object)]
pub struct HomCore {
    db: Arc<Mutex<Database>>,
    exporter: CsvExporter,
    catalog: catalog::MedicationCatalog,
    cancel: CancelFlag,
}

impl HomCore {
    fn wrap(db: Database, export_dir: String) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            exporter: CsvExporter::new(export_dir),
            catalog: catalog::MedicationCatalog::bundled(),
            cancel: CancelFlag::new(),
        }
    }
}

#[uniffi::export]
impl HomCore {
    // =====================================================================
    // Record Operations
    // =====================================================================

    /// Create a visit record; assigns the next id.
    pub fn add_record(&self, draft: FfiRecordDraft) -> Result<FfiPatientRecord, HomError> {
        let draft = draft.try_into()?;
        let mut db = self.db.lock()?;
        let record = db.create_record(draft)?;
        Ok(record.into())
    }

    /// Get a record by id.
    pub fn get_record(&self, id: i64) -> Result<Option<FfiPatientRecord>, HomError> {
        let db = self.db.lock()?;
        let record = db.record(id)?;
        Ok(record.map(|r| r.into()))
    }

    /// Replace the editable fields of an existing record.
    pub fn update_record(&self, id: i64, draft: FfiRecordDraft) -> Result<(), HomError> {
        let draft = draft.try_into()?;
        let mut db = self.db.lock()?;
        db.update_record(id, &draft)?;
        Ok(())
    }

    /// Soft-delete a record. The row stays in the store and in exports.
    pub fn delete_record(&self, id: i64) -> Result<(), HomError> {
        let mut db = self.db.lock()?;
        db.soft_delete_record(id)?;
        Ok(())
    }

    /// Permanently remove every record. Returns rows removed.
    pub fn clear_all(&self) -> Result<u64, HomError> {
        self.cancel.reset();
        let mut db = self.db.lock()?;
        Ok(db.clear_all(&self.cancel)?)
    }

    /// List visible records in the given order, optionally filtered by a
    /// search term over clinic, sex, age and diagnosis/medicine text.
    pub fn list_records(
        &self,
        order: FfiRecordOrder,
        search: Option<String>,
    ) -> Result<Vec<FfiPatientRecord>, HomError> {
        let db = self.db.lock()?;
        let query = RecordQuery {
            order: order.into(),
            search,
            include_deleted: false,
            ..RecordQuery::default()
        };
        let records = db.query_records(&query)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Snapshot of the counters the Settings screen shows.
    pub fn stats(&self) -> Result<FfiStoreStats, HomError> {
        let db = self.db.lock()?;
        let state = db.export_state()?;
        Ok(state.into())
    }

    // =====================================================================
    // Export Operations
    // =====================================================================

    /// Produce the CSV export, regenerating only when the dataset changed.
    pub fn export_csv(
        &self,
        filename: String,
        provider: String,
    ) -> Result<FfiExportOutcome, HomError> {
        self.cancel.reset();
        let mut db = self.db.lock()?;
        let request = ExportRequest { filename, provider };
        let outcome = self.exporter.export(&mut db, &request, &self.cancel)?;
        Ok(outcome.into())
    }

    /// Ask the running export or wipe (if any) to stop at the next
    /// chunk boundary.
    pub fn cancel_pending(&self) {
        self.cancel.cancel();
    }

    // =====================================================================
    // Catalog Operations
    // =====================================================================

    /// Medication name suggestions for a partially typed entry.
    pub fn medication_suggestions(&self, query: String, limit: u32) -> Vec<String> {
        self.catalog.suggest(&query, limit as usize)
    }

    /// Sex choices offered by the intake form.
    pub fn sex_options(&self) -> Vec<String> {
        catalog::sex_options()
    }

    /// Curated diagnosis picker list.
    pub fn diagnosis_options(&self) -> Vec<String> {
        catalog::diagnosis_options()
    }

    /// Dosing-duration picker list.
    pub fn dosage_options(&self) -> Vec<String> {
        catalog::dosage_options()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe prescription line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub medicine: String,
    pub dosage: String,
    pub quantity: u32,
}

impl From<Prescription> for FfiPrescription {
    fn from(p: Prescription) -> Self {
        Self {
            medicine: p.medicine,
            dosage: p.dosage,
            quantity: p.quantity,
        }
    }
}

impl From<FfiPrescription> for Prescription {
    fn from(p: FfiPrescription) -> Self {
        Prescription {
            medicine: p.medicine,
            dosage: p.dosage,
            quantity: p.quantity,
        }
    }
}

/// FFI-safe visit record. Timestamps cross the boundary as RFC 3339.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientRecord {
    pub id: i64,
    pub clinic: String,
    pub sex: String,
    pub age: u32,
    pub creation: String,
    pub diagnoses: Vec<String>,
    pub prescriptions: Vec<FfiPrescription>,
    pub notes: String,
    pub deleted: bool,
}

impl From<PatientRecord> for FfiPatientRecord {
    fn from(record: PatientRecord) -> Self {
        Self {
            id: record.id,
            clinic: record.clinic,
            sex: record.sex.as_str().to_string(),
            age: record.age,
            creation: record.creation.to_rfc3339(),
            diagnoses: record.diagnoses,
            prescriptions: record.prescriptions.into_iter().map(|p| p.into()).collect(),
            notes: record.notes,
            deleted: record.deleted,
        }
    }
}

/// FFI-safe draft of the caller-editable record fields.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRecordDraft {
    pub clinic: String,
    pub sex: String,
    pub age: u32,
    pub diagnoses: Vec<String>,
    pub prescriptions: Vec<FfiPrescription>,
    pub notes: String,
}

impl TryFrom<FfiRecordDraft> for RecordDraft {
    type Error = HomError;

    fn try_from(draft: FfiRecordDraft) -> Result<Self, HomError> {
        let sex = Sex::parse(&draft.sex)
            .ok_or_else(|| HomError::InvalidInput(format!("unrecognized sex `{}`", draft.sex)))?;
        Ok(RecordDraft {
            clinic: draft.clinic,
            sex,
            age: draft.age,
            diagnoses: draft.diagnoses,
            prescriptions: draft.prescriptions.into_iter().map(|p| p.into()).collect(),
            notes: draft.notes,
        })
    }
}

/// Sort orders the list screen can request.
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiRecordOrder {
    NewestFirst,
    OldestFirst,
    IdAscending,
    IdDescending,
}

impl From<FfiRecordOrder> for RecordOrder {
    fn from(order: FfiRecordOrder) -> Self {
        match order {
            FfiRecordOrder::NewestFirst => RecordOrder::NewestFirst,
            FfiRecordOrder::OldestFirst => RecordOrder::OldestFirst,
            FfiRecordOrder::IdAscending => RecordOrder::IdAscending,
            FfiRecordOrder::IdDescending => RecordOrder::IdDescending,
        }
    }
}

/// FFI-safe state snapshot for the Settings screen.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStoreStats {
    pub total_records: i64,
    pub latest_entry: Option<String>,
    pub dirty: bool,
    pub export_filename: Option<String>,
}

impl From<ExportState> for FfiStoreStats {
    fn from(state: ExportState) -> Self {
        Self {
            total_records: state.total_records,
            latest_entry: state.latest_entry.map(|dt| dt.to_rfc3339()),
            dirty: state.dirty,
            export_filename: state.export_filename,
        }
    }
}

/// How the export file was produced.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiExportAction {
    Generated { rows: u64 },
    Renamed,
    Reused,
}

/// FFI-safe export result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExportOutcome {
    pub path: String,
    pub action: FfiExportAction,
}

impl From<ExportOutcome> for FfiExportOutcome {
    fn from(outcome: ExportOutcome) -> Self {
        let action = match outcome.action {
            ExportAction::Generated { rows } => FfiExportAction::Generated { rows },
            ExportAction::Renamed => FfiExportAction::Renamed,
            ExportAction::Reused => FfiExportAction::Reused,
        };
        Self {
            path: outcome.path.to_string_lossy().into_owned(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ffi_draft() -> FfiRecordDraft {
        FfiRecordDraft {
            clinic: "Marigot".into(),
            sex: "Male".into(),
            age: 34,
            diagnoses: vec!["GERD".into()],
            prescriptions: vec![FfiPrescription {
                medicine: "Tylenol".into(),
                dosage: "BD".into(),
                quantity: 7,
            }],
            notes: String::new(),
        }
    }

    #[test]
    fn test_ffi_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let core = open_store_in_memory(dir.path().to_string_lossy().into_owned()).unwrap();

        let record = core.add_record(make_ffi_draft()).unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.sex, "Male");
        assert!(!record.deleted);

        let listed = core.list_records(FfiRecordOrder::NewestFirst, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].clinic, "Marigot");

        core.delete_record(1).unwrap();
        assert!(core.list_records(FfiRecordOrder::NewestFirst, None).unwrap().is_empty());
        // Still fetchable directly
        assert!(core.get_record(1).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_ffi_draft_rejects_bad_sex() {
        let mut draft = make_ffi_draft();
        draft.sex = "other".into();
        let err = RecordDraft::try_from(draft).unwrap_err();
        assert!(matches!(err, HomError::InvalidInput(_)));
    }

    #[test]
    fn test_error_mapping() {
        let err: HomError = DbError::NotFound(7).into();
        assert!(matches!(err, HomError::NotFound(_)));

        let err: HomError = ExportError::InvalidFilename("a/b".into()).into();
        assert!(matches!(err, HomError::InvalidInput(_)));

        let err: HomError = ExportError::Store(DbError::Cancelled).into();
        assert!(matches!(err, HomError::Cancelled));
    }

    #[test]
    fn test_stats_track_writes() {
        let dir = tempfile::tempdir().unwrap();
        let core = open_store_in_memory(dir.path().to_string_lossy().into_owned()).unwrap();

        let stats = core.stats().unwrap();
        assert_eq!(stats.total_records, 0);
        assert!(!stats.dirty);

        core.add_record(make_ffi_draft()).unwrap();
        let stats = core.stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert!(stats.dirty);
        assert!(stats.latest_entry.is_some());
    }
}
