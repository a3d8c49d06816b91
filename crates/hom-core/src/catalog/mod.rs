//! Form option lists and medication lookup.
//!
//! The intake form drives its pickers from these lists; the diagnosis
//! and dosage entries are suggestions, not constraints, so records may
//! carry values outside them.

mod medications;

pub use medications::*;

const SEX_OPTIONS: [&str; 2] = ["Male", "Female"];

const DIAGNOSIS_OPTIONS: [&str; 15] = [
    "GERD",
    "HTN",
    "Arthritis",
    "Undernourished",
    "URI",
    "Headache",
    "Anemia",
    "Vaginitis",
    "Iron deficiency",
    "Rash",
    "Pain",
    "Diabetes",
    "Worried Well",
    "Cough",
    "Fever",
];

const DOSAGE_OPTIONS: [&str; 4] = ["One time", "One week", "One month", "3 month"];

/// Sex choices offered by the intake form.
pub fn sex_options() -> Vec<String> {
    SEX_OPTIONS.iter().map(|s| s.to_string()).collect()
}

/// Curated diagnosis picker list.
pub fn diagnosis_options() -> Vec<String> {
    DIAGNOSIS_OPTIONS.iter().map(|s| s.to_string()).collect()
}

/// Dosing-duration picker list.
pub fn dosage_options() -> Vec<String> {
    DOSAGE_OPTIONS.iter().map(|s| s.to_string()).collect()
}
