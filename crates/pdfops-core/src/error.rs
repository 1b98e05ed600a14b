use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfOpsError {
    #[error("File is empty")]
    EmptyFile,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("PDF operation failed: {0}")]
    Operation(String),
}

/// Input bytes are not a document this engine can open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Not a valid PDF file (missing %PDF header)")]
    NotAPdf,

    #[error("Not a valid ZIP container (missing PK\\x03\\x04 header)")]
    NotAZip,

    #[error("Failed to parse PDF: {0}")]
    Unparseable(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("Document is password protected; unlock it first")]
    Encrypted,

    #[error("Unsupported PDF feature: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid page range: {0}")]
    Range(#[from] RangeError),

    #[error("Invalid rotation angle {0} (expected 90, 180 or 270)")]
    InvalidAngle(i64),

    #[error("At least 2 source documents are required to merge (got {0})")]
    InsufficientSources(usize),

    #[error("Merge entry references unknown document {index} ({available} loaded)")]
    UnknownDocument { index: usize, available: usize },

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("No pages specified")]
    NoPages,

    #[error("Document is already encrypted")]
    AlreadyEncrypted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("range is empty")]
    EmptyRange,

    #[error("invalid token '{0}'")]
    InvalidToken(String),

    #[error("page {page} is out of range (1-{page_count})")]
    OutOfBounds { page: u32, page_count: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("A password is required")]
    PasswordRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Too many failed attempts; try again in {}s", .remaining.as_secs())]
    Locked { remaining: Duration },
}

impl From<RangeError> for PdfOpsError {
    fn from(err: RangeError) -> Self {
        PdfOpsError::Validation(ValidationError::Range(err))
    }
}

impl PdfOpsError {
    /// Whether this error came from a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PdfOpsError::Cancelled)
    }
}
