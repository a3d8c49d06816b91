//! Export engine: builds the CSV file and manages its lifecycle.
//!
//! At most one export file exists at a time. Regeneration streams
//! batches into a temp file in the export directory and atomically
//! renames it into place, so a crash or cancellation mid-export never
//! leaves a partial file and never destroys the previous export.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::cancel::CancelFlag;
use crate::db::{Database, DbError, RecordOrder, RecordQuery};

use super::csv;

/// Records fetched per page while streaming the file.
const EXPORT_BATCH_SIZE: u32 = 100;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("storage error: {0}")]
    Store(DbError),

    #[error("invalid record data: {0}")]
    Validation(String),

    #[error("file error: {0}")]
    File(#[from] std::io::Error),

    #[error("invalid export filename `{0}`")]
    InvalidFilename(String),

    #[error("export cancelled")]
    Cancelled,
}

impl From<DbError> for ExportError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Corrupt(detail) => ExportError::Validation(detail),
            DbError::Cancelled => ExportError::Cancelled,
            other => ExportError::Store(other),
        }
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

/// What the caller asked the engine to produce.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Target filename; `.csv` is appended when missing.
    pub filename: String,
    /// Provider name stamped on every row.
    pub provider: String,
}

/// How the current export file came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportAction {
    /// File was written fresh.
    Generated { rows: u64 },
    /// Previous file renamed; content untouched.
    Renamed,
    /// Existing file already current; no I/O at all.
    Reused,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub action: ExportAction,
}

/// CSV exporter bound to one export directory.
pub struct CsvExporter {
    export_dir: PathBuf,
}

impl CsvExporter {
    pub fn new<P: AsRef<Path>>(export_dir: P) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Produce the export file for the current dataset.
    ///
    /// A clean dataset reuses the existing file when the name matches,
    /// or renames it when only the name changed. Anything else streams a
    /// fresh file. The recorded state is only updated after the file is
    /// safely in place.
    pub fn export(
        &self,
        db: &mut Database,
        request: &ExportRequest,
        cancel: &CancelFlag,
    ) -> ExportResult<ExportOutcome> {
        let filename = normalize_filename(&request.filename)?;
        let target = self.export_dir.join(&filename);

        let state = db.export_state()?;
        let previous = state
            .export_filename
            .as_ref()
            .map(|name| self.export_dir.join(name))
            .filter(|path| path.is_file());

        if !state.dirty {
            if let Some(prev_path) = previous {
                if prev_path == target {
                    debug!("export already current at {}", target.display());
                    return Ok(ExportOutcome {
                        path: target,
                        action: ExportAction::Reused,
                    });
                }
                fs::rename(&prev_path, &target)?;
                db.set_export_filename(&filename)?;
                info!(
                    "renamed export {} -> {}",
                    prev_path.display(),
                    target.display()
                );
                return Ok(ExportOutcome {
                    path: target,
                    action: ExportAction::Renamed,
                });
            }
        }

        let rows = self.generate(db, &target, &filename, &request.provider, cancel)?;
        Ok(ExportOutcome {
            path: target,
            action: ExportAction::Generated { rows },
        })
    }

    /// Stream every record, deleted included, into a fresh file.
    fn generate(
        &self,
        db: &mut Database,
        target: &Path,
        filename: &str,
        provider: &str,
        cancel: &CancelFlag,
    ) -> ExportResult<u64> {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        fs::create_dir_all(&self.export_dir)?;

        // Epoch snapshot; finish_export keeps the dataset dirty if a
        // write lands while the file is being built
        let epoch = db.write_epoch()?;

        let mut temp = NamedTempFile::new_in(&self.export_dir)?;
        let mut buf = String::new();
        csv::render_header(&mut buf);
        temp.write_all(buf.as_bytes())?;

        let query = RecordQuery {
            order: RecordOrder::IdAscending,
            include_deleted: true,
            ..RecordQuery::default()
        };
        let mut rows: u64 = 0;
        for batch in db.record_batches(query, EXPORT_BATCH_SIZE) {
            if cancel.is_cancelled() {
                debug!("export cancelled after {} rows; dropping temp file", rows);
                return Err(ExportError::Cancelled);
            }
            let batch = batch?;
            buf.clear();
            for record in &batch {
                csv::render_record(&mut buf, record, provider);
            }
            temp.write_all(buf.as_bytes())?;
            rows += batch.len() as u64;
        }
        temp.flush()?;

        // The replacement is fully written; now retire any older export
        self.sweep_stale_exports(target)?;
        temp.persist(target).map_err(|e| ExportError::File(e.error))?;

        let clean = db.finish_export(filename, epoch)?;
        if !clean {
            warn!("writes landed during export; dataset stays dirty");
        }
        info!("exported {} rows to {}", rows, target.display());
        Ok(rows)
    }

    /// Remove every other csv in the export directory so at most one
    /// export exists.
    fn sweep_stale_exports(&self, keep: &Path) -> ExportResult<()> {
        for entry in fs::read_dir(&self.export_dir)? {
            let path = entry?.path();
            if path == keep {
                continue;
            }
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv && path.is_file() {
                debug!("removing stale export {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Validate the requested filename and ensure a `.csv` extension.
fn normalize_filename(raw: &str) -> ExportResult<String> {
    let trimmed = raw.trim();
    let rejected = trimmed.is_empty()
        || trimmed == "."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
        || trimmed.contains("..");
    if rejected {
        return Err(ExportError::InvalidFilename(raw.to_string()));
    }
    if trimmed.to_ascii_lowercase().ends_with(".csv") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}.csv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_filename() {
        assert_eq!(normalize_filename("visits").unwrap(), "visits.csv");
        assert_eq!(normalize_filename("visits.csv").unwrap(), "visits.csv");
        assert_eq!(normalize_filename("Visits.CSV").unwrap(), "Visits.CSV");
        assert_eq!(normalize_filename("  padded  ").unwrap(), "padded.csv");
        assert_eq!(
            normalize_filename("March visits").unwrap(),
            "March visits.csv"
        );
    }

    #[test]
    fn test_normalize_filename_rejections() {
        for bad in ["", "   ", ".", "a/b", r"a\b", "..", "up..csv", "nul\0name"] {
            let err = normalize_filename(bad).unwrap_err();
            assert!(
                matches!(err, ExportError::InvalidFilename(_)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_db_error_mapping() {
        let err: ExportError = DbError::Cancelled.into();
        assert!(matches!(err, ExportError::Cancelled));

        let err: ExportError = DbError::Corrupt("record 3: bad sex".into()).into();
        assert!(matches!(err, ExportError::Validation(_)));

        let err: ExportError = DbError::NotFound(7).into();
        assert!(matches!(err, ExportError::Store(DbError::NotFound(7))));
    }
}
