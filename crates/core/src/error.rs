//! Error types for the annotation engine

use crate::annotation::AnnotationId;
use crate::persistence::PersistenceError;

/// Malformed annotation data, rejected locally without halting the editor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f32 },

    #[error("opacity must be within [0, 1] (got {0})")]
    OpacityOutOfRange(f32),

    #[error("font size must be positive (got {0})")]
    FontSize(f32),

    #[error("text annotations need non-empty content")]
    EmptyText,

    #[error("page numbers start at 1")]
    ZeroPage,

    #[error("annotation {0} already exists")]
    DuplicateId(AnnotationId),

    #[error("field `{field}` does not apply to {kind} annotations")]
    FieldMismatch { field: &'static str, kind: &'static str },

    #[error("malformed annotation: {0}")]
    Malformed(String),
}

/// Errors surfaced by the editor and its collaborators
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditorError {
    #[error("editor initialization failed: {0}")]
    Initialization(String),

    #[error("failed to load document: {0}")]
    Load(String),

    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("annotation {0} not found")]
    NotFound(AnnotationId),

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("no text dialog is open")]
    NoPendingDialog,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("editor halted after an earlier failure: {0}")]
    Halted(String),
}

impl EditorError {
    /// Load and render failures stop the editor until it is rebuilt
    pub fn is_halting(&self) -> bool {
        matches!(self, EditorError::Load(_) | EditorError::Render { .. })
    }
}

/// Result type for editor operations
pub type EditorResult<T> = Result<T, EditorError>;
