//! CSV rendering for visit records.
//!
//! Every export uses the same 16-column layout regardless of how many
//! diagnoses or prescriptions a record carries; short lists pad with
//! empty columns, long ones truncate. Free-text fields are always
//! double-quoted with embedded quotes doubled, so clinic names and notes
//! survive commas, quotes and newlines. Fields that cannot contain a
//! delimiter stay bare.

use chrono::{DateTime, Utc};

use crate::models::{PatientRecord, Prescription};

/// Fixed header row for every export.
pub const CSV_HEADER: &str = "Deleted,PatientID,Date,ProviderName,ClinicName,PatientSex,\
                              PatientAge,Diagnosis1,Diagnosis2,Diagnosis3,Prescription1,\
                              Prescription2,Prescription3,Prescription4,Prescription5,\
                              AdditionalNotes";

/// Diagnosis columns in the layout.
pub const DIAGNOSIS_COLUMNS: usize = 3;
/// Prescription columns in the layout.
pub const PRESCRIPTION_COLUMNS: usize = 5;

/// Append the header row.
pub fn render_header(out: &mut String) {
    out.push_str(CSV_HEADER);
    out.push('\n');
}

/// Append one record as a CSV row.
///
/// `provider` is the app-level provider name stamped on every row.
pub fn render_record(out: &mut String, record: &PatientRecord, provider: &str) {
    out.push_str(if record.deleted { "Yes" } else { "" });
    out.push(',');
    out.push_str(&record.id.to_string());
    out.push(',');
    out.push_str(&format_date(&record.creation));
    out.push(',');
    out.push_str(&quote(provider));
    out.push(',');
    out.push_str(&quote(&record.clinic));
    out.push(',');
    out.push_str(record.sex.as_str());
    out.push(',');
    out.push_str(&record.age.to_string());
    for slot in 0..DIAGNOSIS_COLUMNS {
        out.push(',');
        if let Some(diagnosis) = record.diagnoses.get(slot) {
            out.push_str(&quote(diagnosis));
        }
    }
    for slot in 0..PRESCRIPTION_COLUMNS {
        out.push(',');
        if let Some(prescription) = record.prescriptions.get(slot) {
            out.push_str(&quote(&prescription_cell(prescription)));
        }
    }
    out.push(',');
    out.push_str(&quote(&record.notes));
    out.push('\n');
}

/// `MM/DD/YY at hh:mmAM` from the stored UTC instant, with fixed English
/// meridiem text independent of the host locale.
pub fn format_date(creation: &DateTime<Utc>) -> String {
    creation.format("%m/%d/%y at %I:%M%p").to_string()
}

/// One prescription in a single cell.
fn prescription_cell(prescription: &Prescription) -> String {
    format!(
        "{} | {} | {}",
        prescription.medicine, prescription.dosage, prescription.quantity
    )
}

/// Wrap a free-text field in double quotes, doubling embedded quotes.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
