//! Record types that cross module boundaries.

mod document;
mod manifest;

pub use document::{DocType, Document};
pub use manifest::{ManifestRecord, MANIFEST_SCHEMA_ID, MANIFEST_SCHEMA_VERSION};
