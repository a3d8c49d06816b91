//! Patient visit record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Patient sex as recorded on the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Male" => Some(Sex::Male),
            "Female" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// One prescription line: what was given, how, and how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub medicine: String,
    pub dosage: String,
    pub quantity: u32,
}

/// A single patient visit.
///
/// `id` is assigned once at creation from a persisted counter and never
/// reused, even after the record is deleted. `creation` is stamped at
/// creation and immutable afterwards. Soft-deleted records stay in the
/// store with `deleted` set and are excluded from list queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: i64,
    pub clinic: String,
    pub sex: Sex,
    pub age: u32,
    pub creation: DateTime<Utc>,
    /// Diagnoses in the order they were entered. The form caps entry at
    /// three; the export pads or truncates to three columns.
    pub diagnoses: Vec<String>,
    /// Prescriptions in entry order; the export covers five columns.
    pub prescriptions: Vec<Prescription>,
    /// Free-form notes; empty string when none were taken.
    pub notes: String,
    pub deleted: bool,
    /// Concatenated diagnosis and medicine text backing substring search.
    /// Recomputed on every write.
    pub search_digest: String,
}

/// Caller-supplied fields for creating or editing a record.
///
/// The store stamps `id`, `creation`, `deleted` and the search digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub clinic: String,
    pub sex: Sex,
    pub age: u32,
    pub diagnoses: Vec<String>,
    pub prescriptions: Vec<Prescription>,
    pub notes: String,
}

impl RecordDraft {
    /// Derive the searchable digest from diagnoses and medicine names.
    pub fn search_digest(&self) -> String {
        let mut parts: Vec<&str> = self.diagnoses.iter().map(String::as_str).collect();
        parts.extend(self.prescriptions.iter().map(|p| p.medicine.as_str()));
        parts.join(" ")
    }
}
