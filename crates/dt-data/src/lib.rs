//! Delimited-text data handling
//!
//! Parses flat text files into point features, keeps per-column statistics
//! and maintains the identifier/row index used by table models.

pub mod cache;
pub mod config;
pub mod index;
pub mod schema;
pub mod sources;

use thiserror::Error;

// Re-exports
pub use cache::{MinMaxCache, ValueRange};
pub use config::{FieldRef, NullConfig, ProviderConfig};
pub use index::{IdentityIndex, RemovedRow};
pub use schema::{SchemaDetector, SchemaInfo};
pub use sources::{Capabilities, DelimitedTextProvider, FeatureCursor, InvalidLine, InvalidReason, RecordLayout};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Invalid connection string: {0}")]
    InvalidUri(String),

    #[error("File has no records: {0}")]
    EmptyFile(String),

    #[error("Coordinate field not found: {0}")]
    MissingCoordinateField(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}
