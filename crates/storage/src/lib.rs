//! Persistence gateways for annotation sets.
//!
//! [`FileGateway`] writes the annotation list and an annotated copy of the
//! source PDF to disk; [`HttpGateway`] posts the same request to a remote
//! save endpoint.

mod file_gateway;
mod http_gateway;
pub mod pdf_annotations;

pub use file_gateway::{FileGateway, SavedArtifacts};
pub use http_gateway::HttpGateway;

use pdf_markup_core::{Annotation, PersistenceError};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("source PDF not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("invalid annotations: {0}")]
    InvalidAnnotations(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl From<StorageError> for PersistenceError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(err) => PersistenceError::Io(err.to_string()),
            StorageError::Serde(err) => PersistenceError::Serialization(err.to_string()),
            other => PersistenceError::Rejected(other.to_string()),
        }
    }
}

/// Reject names that could escape the source directory
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    if filename.trim().is_empty() || filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(StorageError::InvalidFilename(filename.to_owned()));
    }
    Ok(())
}

/// Read a JSON array of annotations, validating every entry
pub fn load_annotations(path: impl AsRef<Path>) -> Result<Vec<Annotation>, StorageError> {
    let bytes = fs::read(path.as_ref())?;
    Annotation::list_from_json(&bytes).map_err(|err| StorageError::InvalidAnnotations(err.to_string()))
}
