//! CSV export: row rendering and file lifecycle.

mod csv;
mod engine;

pub use csv::*;
pub use engine::*;
