//! Domain models for the visit log.

mod record;

pub use record::*;
