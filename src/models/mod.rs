//! Core data structures shared by sources, validation, storage and export

pub mod control;
pub mod manifest;
pub mod row_set;
pub mod value;

pub use control::ControlRecord;
pub use manifest::{FileManifestEntry, Locator};
pub use row_set::{RowSet, RowSetError};
pub use value::{InferredType, Value};
