//! Medication name lookup for the prescription form.

use strsim::jaro_winkler;

/// Bundled formulary; first CSV column is the medication name.
const MEDICATIONS_CSV: &str = include_str!("../../resources/medications.csv");

/// Minimum similarity for a fuzzy suggestion.
const FUZZY_THRESHOLD: f64 = 0.85;

/// Medication names available to the prescription form.
pub struct MedicationCatalog {
    names: Vec<String>,
}

impl MedicationCatalog {
    /// Load the bundled formulary.
    pub fn bundled() -> Self {
        Self::from_csv(MEDICATIONS_CSV)
    }

    /// Parse a CSV whose first column holds medication names; the header
    /// row is skipped.
    pub fn from_csv(raw: &str) -> Self {
        let names = raw
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Suggest medications for a partially typed name.
    ///
    /// Prefix matches rank first in list order, then near-misses by
    /// Jaro-Winkler similarity, capped at `limit`.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut prefixed: Vec<&String> = Vec::new();
        let mut fuzzy: Vec<(f64, &String)> = Vec::new();
        for name in &self.names {
            let lower = name.to_lowercase();
            if lower.starts_with(&needle) {
                prefixed.push(name);
            } else {
                let score = jaro_winkler(&needle, &lower);
                if score >= FUZZY_THRESHOLD {
                    fuzzy.push((score, name));
                }
            }
        }
        fuzzy.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        prefixed
            .into_iter()
            .chain(fuzzy.into_iter().map(|(_, name)| name))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for MedicationCatalog {
    fn default() -> Self {
        Self::bundled()
    }
}
